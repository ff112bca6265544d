use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<(), FileStoreError>;
    async fn load(&self, filename: &str) -> Result<Vec<u8>, FileStoreError>;
    /// Best-effort delete: removing an absent file succeeds.
    async fn delete(&self, filename: &str) -> Result<(), FileStoreError>;
}

// ---------------- Local filesystem implementation ----------------
pub struct FsFileStore {
    root: PathBuf,
}

impl FsFileStore {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("upload store at '{}'", root.display());
        Ok(Self { root })
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}

#[async_trait]
impl FileStore for FsFileStore {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<(), FileStoreError> {
        std::fs::write(self.path_for(filename), bytes)
            .map_err(|e| FileStoreError::Other(e.to_string()))
    }

    async fn load(&self, filename: &str) -> Result<Vec<u8>, FileStoreError> {
        match std::fs::read(self.path_for(filename)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FileStoreError::NotFound),
            Err(e) => Err(FileStoreError::Other(e.to_string())),
        }
    }

    async fn delete(&self, filename: &str) -> Result<(), FileStoreError> {
        match std::fs::remove_file(self.path_for(filename)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileStoreError::Other(e.to_string())),
        }
    }
}

/// Reduce an uploaded filename to a safe basename: path components dropped,
/// anything outside `[A-Za-z0-9._-]` replaced with `_`, leading dots and
/// underscores trimmed so the result cannot be a hidden or traversal name.
pub fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// Case-insensitive extension check against the configured allow-list.
pub fn extension_allowed(filename: &str, allowed: &[String]) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            allowed.iter().any(|a| a == &e)
        })
        .unwrap_or(false)
}
