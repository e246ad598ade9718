//! Artifact Cache (C1): a content-addressed store for downloaded engine
//! jars and installers, plus a convenience index from `(engine, version)`
//! to content hash. Grounded on the shard/entry split in
//! `uv_cache::{Cache, CacheShard, CacheEntry}`; writes are atomic
//! temp-file-then-rename so correctness never depends on eviction policy.

use crate::error::Result;
use crate::models::EngineFamily;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

pub struct ArtifactCache {
    root: PathBuf,
    index: RwLock<HashMap<(EngineFamily, String), String>>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: RwLock::new(HashMap::new()),
        }
    }

    fn shard_path(&self, hash: &str) -> PathBuf {
        self.root.join(&hash[0..2]).join(hash)
    }

    pub async fn has(&self, hash: &str) -> bool {
        tokio::fs::try_exists(self.shard_path(hash)).await.unwrap_or(false)
    }

    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.shard_path(hash)
    }

    /// Moves `source` into the content-addressed store under its own
    /// SHA-256 digest, verifying it matches `expected_sha256` when given.
    pub async fn ingest(&self, source: &Path, expected_sha256: Option<&str>) -> Result<String> {
        let bytes = tokio::fs::read(source).await?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = format!("{:x}", hasher.finalize());

        if let Some(expected) = expected_sha256 {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(crate::error::AppError::ChecksumMismatch {
                    message: format!("expected {expected}, got {digest}"),
                });
            }
        }

        let dest = self.shard_path(&digest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            let tmp = dest.with_extension("tmp");
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            tokio::fs::rename(&tmp, &dest).await?;
        }
        tokio::fs::remove_file(source).await.ok();
        Ok(digest)
    }

    pub async fn remember_version(&self, engine: EngineFamily, version: &str, hash: &str) {
        self.index.write().await.insert((engine, version.to_string()), hash.to_string());
    }

    pub async fn hash_for_version(&self, engine: EngineFamily, version: &str) -> Option<String> {
        self.index.read().await.get(&(engine, version.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn ingest_is_content_addressed_and_idempotent() {
        let dir = tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("cache"));

        let src1 = dir.path().join("a.jar");
        tokio::fs::write(&src1, b"hello world").await.unwrap();
        let hash1 = cache.ingest(&src1, None).await.unwrap();

        let src2 = dir.path().join("b.jar");
        tokio::fs::write(&src2, b"hello world").await.unwrap();
        let hash2 = cache.ingest(&src2, None).await.unwrap();

        assert_eq!(hash1, hash2);
        assert!(cache.has(&hash1).await);
    }

    #[tokio::test]
    async fn ingest_rejects_checksum_mismatch() {
        let dir = tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("cache"));
        let src = dir.path().join("a.jar");
        tokio::fs::write(&src, b"hello world").await.unwrap();
        let err = cache.ingest(&src, Some("deadbeef")).await.unwrap_err();
        assert_eq!(err.kind(), "ChecksumMismatch");
    }
}
