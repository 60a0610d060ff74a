use crate::config::StorageConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("filename {0:?} does not name a file")]
    InvalidFilename(String),
    #[error("failed to store {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub public_path: String,
}

/// Flat upload directory. A later upload with the same name replaces the earlier one.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    public_prefix: String,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(storage_config: &StorageConfig) -> Self {
        Self::new(&storage_config.upload_dir, &storage_config.public_prefix)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub async fn save(&self, filename: &str, contents: &[u8]) -> Result<StoredFile, StorageError> {
        let name = sanitize_filename(filename)
            .ok_or_else(|| StorageError::InvalidFilename(filename.to_string()))?;
        let path = self.dir.join(&name);

        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| StorageError::Write {
                path: path.display().to_string(),
                source,
            })?;

        tracing::debug!("Stored {} bytes at {:?}", contents.len(), path);
        Ok(StoredFile {
            public_path: format!("{}/{}", self.public_prefix, name),
            path,
        })
    }
}

/// Keeps only the final path component so a client name cannot leave the upload directory.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let last = filename.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}
