//! Process configuration, read once at startup from the environment (and `.env`, if present).

use serde::Deserialize;
use serde::de::value::MapDeserializer;
use thiserror::Error;

use crate::archive::DEFAULT_KEY_PREFIX;
use crate::db::pg::WarehouseOptions;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub warehouse_host: String,
    #[serde(default = "default_warehouse_port")]
    pub warehouse_port: String,
    pub warehouse_user: String,
    pub warehouse_password: String,
    pub warehouse_database: String,
    #[serde(default = "default_max_connections")]
    pub warehouse_max_connections: String,

    #[serde(default = "default_archive_backend")]
    pub archive_backend: String,
    #[serde(default)]
    pub archive_bucket: String,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    #[serde(default = "default_server_api_port")]
    pub server_api_port: String,
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_warehouse_port() -> String {
    "5439".into()
}

fn default_max_connections() -> String {
    "5".into()
}

fn default_archive_backend() -> String {
    "s3".into()
}

fn default_archive_dir() -> String {
    "archive".into()
}

fn default_archive_prefix() -> String {
    DEFAULT_KEY_PREFIX.into()
}

fn default_server_api_port() -> String {
    "8080".into()
}

fn default_service_name() -> String {
    env!("CARGO_PKG_NAME").into()
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveBackend {
    S3 { bucket: String },
    Fs { root: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Env {
    /// Loads `.env` (when present) and deserializes the process environment
    pub fn new() -> EnvResult<Self> {
        match dotenvy::dotenv() {
            Ok(_) => (),
            Err(e) if e.not_found() => (),
            Err(e) => return Err(e.into()),
        }

        from_iter(std::env::vars())
    }

    pub fn warehouse(&self) -> EnvResult<WarehouseOptions> {
        Ok(WarehouseOptions {
            host: self.warehouse_host.clone(),
            port: parse("WAREHOUSE_PORT", &self.warehouse_port)?,
            user: self.warehouse_user.clone(),
            password: self.warehouse_password.clone(),
            database: self.warehouse_database.clone(),
            max_connections: parse("WAREHOUSE_MAX_CONNECTIONS", &self.warehouse_max_connections)?,
        })
    }

    pub fn archive_backend(&self) -> EnvResult<ArchiveBackend> {
        match self.archive_backend.to_ascii_lowercase().as_str() {
            "s3" if self.archive_bucket.is_empty() => {
                Err(EnvErr::MissingValue("ARCHIVE_BUCKET".into()))
            }
            "s3" => Ok(ArchiveBackend::S3 {
                bucket: self.archive_bucket.clone(),
            }),
            "fs" => Ok(ArchiveBackend::Fs {
                root: self.archive_dir.clone(),
            }),
            other => Err(invalid("ARCHIVE_BACKEND", other)),
        }
    }

    pub fn server_port(&self) -> EnvResult<u16> {
        parse("SERVER_API_PORT", &self.server_api_port)
    }

    /// OTLP collector endpoint, if export is enabled
    pub fn otel_endpoint(&self) -> Option<&str> {
        Some(self.otel_exporter_otlp_endpoint.trim()).filter(|e| !e.is_empty())
    }

    pub fn log_format(&self) -> EnvResult<LogFormat> {
        match self.log_format.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(invalid("LOG_FORMAT", other)),
        }
    }
}

pub fn from_iter<Iter, T>(iter: Iter) -> EnvResult<T>
where
    T: serde::de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    let deserializer = MapDeserializer::<_, serde::de::value::Error>::new(iter.into_iter());
    Ok(T::deserialize(deserializer)?)
}

fn parse<T: core::str::FromStr>(name: &'static str, value: &str) -> EnvResult<T> {
    value.trim().parse::<T>().map_err(|_| invalid(name, value))
}

fn invalid(name: &'static str, value: &str) -> EnvErr {
    EnvErr::InvalidValue {
        name,
        value: value.to_string(),
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error("env deserialization error: {0}")]
    Deserialize(#[from] serde::de::value::Error),

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },
}
