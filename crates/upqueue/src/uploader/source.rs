//! Where uploaders read job bytes from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::UploadError;

/// Resolves a source file reference to its bytes.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn fetch(&self, source_file_ref: &str) -> Result<Vec<u8>, UploadError>;
}

/// Reads files from a local spool directory, one file per reference.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    root: PathBuf,
}

impl LocalFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, source_file_ref: &str) -> Result<PathBuf, UploadError> {
        let escapes = source_file_ref.is_empty()
            || source_file_ref == "."
            || source_file_ref == ".."
            || source_file_ref.contains(['/', '\\']);
        if escapes {
            return Err(UploadError::Source {
                reference: source_file_ref.to_string(),
                reason: "reference does not name a file inside the spool directory".to_string(),
            });
        }
        Ok(self.root.join(source_file_ref))
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    async fn fetch(&self, source_file_ref: &str) -> Result<Vec<u8>, UploadError> {
        let path = self.path_for(source_file_ref)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| UploadError::Source {
                reference: source_file_ref.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })
    }
}
