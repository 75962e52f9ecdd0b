//! Filesystem-backed result store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::registry;

use super::store::{ResultRef, ResultStore, ResultStoreError};

/// Result store rooted at an explicit directory, injected at startup.
pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ResultStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact name for a job: `{job_id}.{target_ext}`.
    fn result_name(job_id: &str, target_format: &str) -> ResultRef {
        format!("{}.{}", job_id, registry::normalize(target_format))
    }

    /// Resolve a reference to a path inside the root, rejecting anything
    /// that could escape it.
    fn resolve(&self, result_ref: &str) -> Result<PathBuf, ResultStoreError> {
        if result_ref.is_empty()
            || result_ref.contains('/')
            || result_ref.contains('\\')
            || result_ref.contains("..")
        {
            return Err(ResultStoreError::InvalidRef(result_ref.to_string()));
        }
        Ok(self.root.join(result_ref))
    }

    /// Create the destination file exclusively, mapping a pre-existing file
    /// to `AlreadyExists`.
    async fn create_exclusive(
        &self,
        job_id: &str,
        path: &Path,
    ) -> Result<tokio::fs::File, ResultStoreError> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    ResultStoreError::AlreadyExists {
                        job_id: job_id.to_string(),
                    }
                } else {
                    ResultStoreError::Io(e)
                }
            })
    }
}

#[async_trait]
impl ResultStore for FsResultStore {
    fn ref_for(&self, job_id: &str, target_format: &str) -> ResultRef {
        Self::result_name(job_id, target_format)
    }

    async fn put(
        &self,
        job_id: &str,
        target_format: &str,
        bytes: &[u8],
    ) -> Result<ResultRef, ResultStoreError> {
        let result_ref = Self::result_name(job_id, target_format);
        let path = self.resolve(&result_ref)?;

        let mut file = self.create_exclusive(job_id, &path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        Ok(result_ref)
    }

    async fn put_file(
        &self,
        job_id: &str,
        target_format: &str,
        source: &Path,
    ) -> Result<ResultRef, ResultStoreError> {
        let result_ref = Self::result_name(job_id, target_format);
        let path = self.resolve(&result_ref)?;

        // Exclusive create reserves the name, then the payload is copied in.
        // Copy instead of rename so the store works across filesystems.
        let mut dest = self.create_exclusive(job_id, &path).await?;
        let mut src = fs::File::open(source).await?;
        tokio::io::copy(&mut src, &mut dest).await?;
        dest.flush().await?;
        drop(src);

        if let Err(e) = fs::remove_file(source).await {
            tracing::debug!("Failed to remove converter output {:?}: {}", source, e);
        }

        Ok(result_ref)
    }

    async fn open(&self, result_ref: &str) -> Result<tokio::fs::File, ResultStoreError> {
        let path = self.resolve(result_ref)?;
        fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResultStoreError::NotFound(result_ref.to_string())
            } else {
                ResultStoreError::Io(e)
            }
        })
    }

    async fn len(&self, result_ref: &str) -> Result<u64, ResultStoreError> {
        let path = self.resolve(result_ref)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ResultStoreError::NotFound(result_ref.to_string()))
            }
            Err(e) => Err(ResultStoreError::Io(e)),
        }
    }

    async fn delete(&self, result_ref: &str) -> Result<(), ResultStoreError> {
        let path = self.resolve(result_ref)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Already gone: the sweep retried, or nothing was written.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ResultStoreError::Io(e)),
        }
    }
}
