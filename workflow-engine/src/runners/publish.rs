// Artifact Publisher
// Registry upload seam with a filesystem-backed implementation

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from publishing an artifact
#[derive(Debug, Error)]
pub enum PublishError {
    /// The (package, version) pair is already published. Never retried:
    /// re-running a finished upload must surface this, not report success.
    #[error("version '{version}' of '{package}' already exists in the registry")]
    Conflict { package: String, version: String },

    #[error("artifact not found: {path}")]
    MissingArtifact { path: PathBuf },

    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receipt for a successful upload
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub package: String,
    pub version: String,
    /// Where the artifact landed
    pub location: PathBuf,
}

/// Metadata written next to each published artifact
#[derive(Debug, Serialize)]
struct VersionMetadata<'a> {
    package: &'a str,
    version: &'a str,
    file: String,
}

/// Upload seam. The scheduler and executor only see this trait, so a real
/// registry client can replace the local directory implementation.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(
        &self,
        package: &str,
        version: &str,
        artifact: &Path,
    ) -> Result<PublishReceipt, PublishError>;
}

/// Filesystem-backed registry: one directory per (package, version).
#[derive(Debug, Clone)]
pub struct DirRegistry {
    root: PathBuf,
}

impl DirRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default registry location under the user's home directory
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gantry")
            .join("registry")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, package: &str, version: &str) -> PathBuf {
        self.root.join(package).join(version)
    }

    /// Whether a version is already published
    pub fn contains(&self, package: &str, version: &str) -> bool {
        self.version_dir(package, version).exists()
    }
}

#[async_trait]
impl ArtifactPublisher for DirRegistry {
    async fn publish(
        &self,
        package: &str,
        version: &str,
        artifact: &Path,
    ) -> Result<PublishReceipt, PublishError> {
        if !artifact.exists() {
            return Err(PublishError::MissingArtifact {
                path: artifact.to_path_buf(),
            });
        }

        let version_dir = self.version_dir(package, version);
        if version_dir.exists() {
            return Err(PublishError::Conflict {
                package: package.to_string(),
                version: version.to_string(),
            });
        }

        tokio::fs::create_dir_all(&version_dir).await?;

        let file_name = artifact
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "artifact".into());
        let destination = version_dir.join(&file_name);
        tokio::fs::copy(artifact, &destination).await?;

        let metadata = VersionMetadata {
            package,
            version,
            file: file_name.to_string_lossy().into_owned(),
        };
        let metadata_json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| PublishError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        tokio::fs::write(version_dir.join("metadata.json"), metadata_json).await?;

        tracing::info!(package, version, location = %destination.display(), "artifact published");

        Ok(PublishReceipt {
            package: package.to_string(),
            version: version.to_string(),
            location: destination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn artifact_in(dir: &Path) -> PathBuf {
        let path = dir.join("pkg-1.0.0.tar.gz");
        fs::write(&path, b"artifact bytes").unwrap();
        path
    }

    #[tokio::test]
    async fn test_publish_and_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = DirRegistry::new(tmp.path().join("registry"));
        let artifact = artifact_in(tmp.path());

        let receipt = registry
            .publish("cmethods", "1.0.1", &artifact)
            .await
            .unwrap();
        assert_eq!(receipt.package, "cmethods");
        assert!(receipt.location.exists());
        assert!(registry.contains("cmethods", "1.0.1"));

        // Publishing the same version again must conflict, not overwrite
        let err = registry
            .publish("cmethods", "1.0.1", &artifact)
            .await
            .unwrap_err();
        match err {
            PublishError::Conflict { package, version } => {
                assert_eq!(package, "cmethods");
                assert_eq!(version, "1.0.1");
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        // The original artifact is untouched
        let published = fs::read(&receipt.location).unwrap();
        assert_eq!(published, b"artifact bytes");

        // Metadata sits next to the artifact
        let metadata_path = receipt.location.parent().unwrap().join("metadata.json");
        let metadata = fs::read_to_string(metadata_path).unwrap();
        assert!(metadata.contains("\"version\": \"1.0.1\""));
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = DirRegistry::new(tmp.path().join("registry"));

        let err = registry
            .publish("cmethods", "1.0.1", &tmp.path().join("nope.tar.gz"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::MissingArtifact { .. }));
    }

    #[tokio::test]
    async fn test_different_versions_coexist() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = DirRegistry::new(tmp.path().join("registry"));
        let artifact = artifact_in(tmp.path());

        registry
            .publish("cmethods", "1.0.0", &artifact)
            .await
            .unwrap();
        registry
            .publish("cmethods", "1.0.1", &artifact)
            .await
            .unwrap();

        assert!(registry.contains("cmethods", "1.0.0"));
        assert!(registry.contains("cmethods", "1.0.1"));
    }
}
