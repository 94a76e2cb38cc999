use std::io;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::domain::{Artifact, Identifier};
use crate::error::HarvestError;
use crate::interactions::to_csv_bytes;

/// Existence of a complete artifact is the cache state. Snapshots are raw
/// fetched content kept for sources that re-validate before reuse.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn has_complete_artifact(&self, identifier: &Identifier) -> bool;
    async fn load_snapshot(&self, identifier: &Identifier) -> Option<Vec<u8>>;
}

/// Writes final artifacts and raw snapshots. Later writes overwrite.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Returns a description of where the artifact was stored.
    async fn save(&self, artifact: &Artifact) -> Result<String, HarvestError>;
    async fn save_raw(&self, identifier: &Identifier, content: &[u8]) -> Result<(), HarvestError>;
}

/// Filesystem layout: `<artifact_dir>/<ID><suffix>` for artifacts and
/// `<snapshot_dir>/<ID>.html` for snapshots.
#[derive(Debug, Clone)]
pub struct FsStore {
    artifact_dir: Utf8PathBuf,
    artifact_suffix: String,
    snapshot_dir: Option<Utf8PathBuf>,
}

impl FsStore {
    pub fn new(artifact_dir: impl Into<Utf8PathBuf>, artifact_suffix: impl Into<String>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            artifact_suffix: artifact_suffix.into(),
            snapshot_dir: None,
        }
    }

    pub fn with_snapshots(mut self, snapshot_dir: impl Into<Utf8PathBuf>) -> Self {
        self.snapshot_dir = Some(snapshot_dir.into());
        self
    }

    pub fn artifact_path(&self, identifier: &Identifier) -> Utf8PathBuf {
        self.artifact_dir
            .join(format!("{}{}", identifier.as_str(), self.artifact_suffix))
    }

    pub fn snapshot_path(&self, identifier: &Identifier) -> Option<Utf8PathBuf> {
        self.snapshot_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.html", identifier.as_str())))
    }

    pub async fn ensure_dirs(&self) -> Result<(), HarvestError> {
        create_dir(&self.artifact_dir).await?;
        if let Some(dir) = &self.snapshot_dir {
            create_dir(dir).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FsStore {
    async fn has_complete_artifact(&self, identifier: &Identifier) -> bool {
        tokio::fs::metadata(self.artifact_path(identifier).as_std_path())
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    async fn load_snapshot(&self, identifier: &Identifier) -> Option<Vec<u8>> {
        let path = self.snapshot_path(identifier)?;
        match tokio::fs::read(path.as_std_path()).await {
            Ok(content) => Some(content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(identifier = %identifier, path = %path, error = %err, "unreadable snapshot");
                None
            }
        }
    }
}

#[async_trait]
impl Persister for FsStore {
    async fn save(&self, artifact: &Artifact) -> Result<String, HarvestError> {
        let bytes = match artifact {
            Artifact::Record(record) => serde_json::to_vec_pretty(record)
                .map_err(|err| HarvestError::Serialize(err.to_string()))?,
            Artifact::Table(table) => to_csv_bytes(table)?,
        };
        let path = self.artifact_path(artifact.identifier());
        write_bytes_atomic(&path, &bytes).await?;
        Ok(path.to_string())
    }

    async fn save_raw(&self, identifier: &Identifier, content: &[u8]) -> Result<(), HarvestError> {
        let Some(path) = self.snapshot_path(identifier) else {
            return Ok(());
        };
        write_bytes_atomic(&path, content).await
    }
}

async fn create_dir(path: &Utf8Path) -> Result<(), HarvestError> {
    tokio::fs::create_dir_all(path.as_std_path())
        .await
        .map_err(|err| HarvestError::Filesystem(format!("create {path}: {err}")))
}

/// Writes through a sibling temp file and renames it into place.
pub async fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
    if let Some(parent) = path.parent() {
        create_dir(parent).await?;
    }
    let tmp_path = Utf8PathBuf::from(format!("{path}.tmp"));
    tokio::fs::write(tmp_path.as_std_path(), content)
        .await
        .map_err(|err| HarvestError::Filesystem(format!("write {tmp_path}: {err}")))?;
    tokio::fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .await
        .map_err(|err| HarvestError::Filesystem(format!("rename to {path}: {err}")))?;
    Ok(())
}
