use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::archive::{Archive, ArchiveError, ArchiveResult};

/// Writes archive objects under a local directory, one file per key
#[derive(Debug, Clone)]
pub struct FsArchive {
    root: PathBuf,
}

impl FsArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps `key` to a path under `root`. Only plain relative segments are allowed.
    fn resolve(&self, key: &str) -> ArchiveResult<PathBuf> {
        let relative = Path::new(key);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !plain {
            return Err(ArchiveError::InvalidKey(key.to_string()));
        }

        let path = self.root.join(relative);
        if !path.starts_with(&self.root) {
            return Err(ArchiveError::InvalidKey(key.to_string()));
        }

        Ok(path)
    }
}

#[async_trait]
impl Archive for FsArchive {
    #[instrument(skip(self, body), fields(root = %self.root.display()))]
    async fn put(&self, key: &str, body: Vec<u8>) -> ArchiveResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ArchiveError::AlreadyExists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(&body).await?;
        file.sync_all().await?;

        Ok(())
    }
}
