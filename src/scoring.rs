use core::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound on any computed risk score
pub const MAX_SCORE: u8 = 100;

const REVIEW_COUNT_THRESHOLD: u64 = 3;
const TOXICITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentType(pub String);

impl ContentType {
    /// `true` for the media types that carry the visual-media surcharge
    pub fn is_visual_media(&self) -> bool {
        matches!(self.0.as_str(), "video" | "image")
    }
}

impl From<&str> for ContentType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Feature set consumed by the scorer.
///
/// Every field is optional on the wire and falls back to a neutral value, so a partially
/// populated feature set always scores. An absent `review_count` is unknown rather than zero and
/// never triggers the low-review rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskFeatures {
    pub user_is_flagged: bool,
    pub content_type: Option<ContentType>,
    pub review_count: Option<u64>,
    pub toxicity_score: f64,
    pub blacklist_match: bool,
}

/// A single additive rule
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub weight: u8,
    pub applies: fn(&RiskFeatures) -> bool,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "flagged_user",
        weight: 30,
        applies: |f| f.user_is_flagged,
    },
    Rule {
        name: "visual_media",
        weight: 10,
        applies: |f| f.content_type.as_ref().is_some_and(ContentType::is_visual_media),
    },
    Rule {
        name: "low_review_count",
        weight: 5,
        applies: |f| f.review_count.is_some_and(|n| n < REVIEW_COUNT_THRESHOLD),
    },
    Rule {
        name: "high_toxicity",
        weight: 30,
        applies: |f| f.toxicity_score > TOXICITY_THRESHOLD,
    },
    Rule {
        name: "blacklist_match",
        weight: 25,
        applies: |f| f.blacklist_match,
    },
];

/// Scores `features` against the built-in rule table
pub fn score(features: &RiskFeatures) -> u8 {
    score_with(RULES, features)
}

/// Sums the weights of every rule in `rules` that applies to `features`, clamped to
/// [`MAX_SCORE`].
pub fn score_with(rules: &[Rule], features: &RiskFeatures) -> u8 {
    let raw: u32 = rules
        .iter()
        .filter(|rule| (rule.applies)(features))
        .map(|rule| u32::from(rule.weight))
        .sum();

    raw.min(u32::from(MAX_SCORE)) as u8
}

/// Names of the built-in rules triggered by `features`
pub fn triggered_rules(features: &RiskFeatures) -> Vec<&'static str> {
    RULES
        .iter()
        .filter(|rule| (rule.applies)(features))
        .map(|rule| rule.name)
        .collect()
}
