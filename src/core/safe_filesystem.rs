//! Safe Filesystem (C11): a path-traversal-proof file browser and editor
//! scoped to a single server's storage root. Grounded on
//! `hostd::security::path_sanitizer::PathSanitizer`, generalized from
//! archive-extraction prefixes to arbitrary browse/read/write operations.

use crate::error::{AppError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct SafeFilesystem {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: Option<u64>,
}

impl SafeFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a client-supplied relative path against the server root,
    /// rejecting absolute paths, drive prefixes, and any `..` segment.
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        if relative.is_empty() {
            return Ok(self.root.clone());
        }
        let normalized = relative.replace('\\', "/");
        if normalized.starts_with('/') || normalized.contains(':') {
            return Err(AppError::InvalidPath {
                message: "absolute paths are not allowed".to_string(),
            });
        }
        if normalized.split('/').any(|segment| segment == "..") {
            return Err(AppError::InvalidPath {
                message: "parent directory traversal is not allowed".to_string(),
            });
        }
        let candidate = self.root.join(&normalized);
        if !candidate.starts_with(&self.root) {
            return Err(AppError::InvalidPath {
                message: "path escapes the server root".to_string(),
            });
        }
        Ok(candidate)
    }

    pub async fn list(&self, relative: &str) -> Result<Vec<DirEntry>> {
        let path = self.resolve(relative)?;
        let mut reader = fs::read_dir(&path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size_bytes: if metadata.is_dir() { None } else { Some(metadata.len()) },
            });
        }
        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });
        Ok(entries)
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        Ok(fs::read(&path).await?)
    }

    pub async fn write(&self, relative: &str, contents: &[u8]) -> Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("hearth-tmp");
        let mut tmp = fs::File::create(&tmp_path).await?;
        tmp.write_all(contents).await?;
        tmp.flush().await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    pub async fn mkdir(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        fs::create_dir_all(&path).await?;
        Ok(())
    }

    pub async fn delete(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        let metadata = fs::metadata(&path).await?;
        if metadata.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    pub fn absolute(&self, relative: &str) -> Result<PathBuf> {
        self.resolve(relative)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn rejects_parent_traversal() {
        let dir = tempdir().unwrap();
        let fs = SafeFilesystem::new(dir.path());
        let err = fs.read("../escape.txt").await.unwrap_err();
        assert_eq!(err.kind(), "InvalidPath");
    }

    #[tokio::test]
    async fn rejects_absolute_paths() {
        let dir = tempdir().unwrap();
        let fs = SafeFilesystem::new(dir.path());
        let err = fs.read("/etc/passwd").await.unwrap_err();
        assert_eq!(err.kind(), "InvalidPath");
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let fs = SafeFilesystem::new(dir.path());
        fs.write("config/server.properties", b"motd=hi").await.unwrap();
        let contents = fs.read("config/server.properties").await.unwrap();
        assert_eq!(contents, b"motd=hi");
    }

    #[tokio::test]
    async fn list_sorts_directories_first() {
        let dir = tempdir().unwrap();
        let fs = SafeFilesystem::new(dir.path());
        fs.write("b.txt", b"x").await.unwrap();
        fs.mkdir("a_dir").await.unwrap();
        let entries = fs.list("").await.unwrap();
        assert!(entries[0].is_dir);
    }
}
