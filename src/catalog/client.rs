//! Catalog Client (C2): the HTTP boundary to the upstream modpack catalog.
//! Grounded on `hostd::external_apis::modrinth::ModrinthApiClient`, trimmed
//! to the operations the provisioning pipeline needs and hardened with the
//! timeout/retry/size-cap policy this control plane requires of any upstream.

use crate::catalog::types::{
    CatalogSearchResponse, Changelog, FileDetail, ModFileDownload, ModMetadata, ModpackDescription, ModpackFile, ModpackMeta,
};
use crate::error::{AppError, Result};
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DOWNLOAD_SIZE_CEILING: u64 = 500 * 1024 * 1024;
const MAX_RETRIES: u32 = 3;
const MOD_METADATA_BATCH_LIMIT: usize = 100;

pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn require_enabled(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(AppError::CatalogDisabled {
                message: "no catalog API key configured".to_string(),
            });
        }
        Ok(())
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    async fn get_with_retry<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = self.apply_auth(self.http.get(url)).timeout(METADATA_TIMEOUT);
            let result = request.send().await;
            match result {
                Ok(response) if response.status().is_server_error() && attempt < MAX_RETRIES => {
                    tracing::warn!(url, attempt, status = %response.status(), "catalog 5xx, retrying");
                    tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt - 1))).await;
                    continue;
                }
                Ok(response) => {
                    let response = response.error_for_status()?;
                    return Ok(response.json::<T>().await?);
                }
                Err(err) if attempt < MAX_RETRIES && err.is_connect() => {
                    tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt - 1))).await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<CatalogSearchResponse> {
        self.require_enabled()?;
        let url = format!(
            "{}/search?query={}&limit={}&offset={}",
            self.base_url,
            urlencoding_query(query),
            limit,
            offset
        );
        self.get_with_retry(&url).await
    }

    pub async fn modpack_meta(&self, modpack_id: &str) -> Result<ModpackMeta> {
        self.require_enabled()?;
        let url = format!("{}/modpack/{modpack_id}", self.base_url);
        self.get_with_retry(&url).await
    }

    pub async fn modpack_files(&self, modpack_id: &str) -> Result<Vec<ModpackFile>> {
        self.require_enabled()?;
        let url = format!("{}/modpack/{modpack_id}/files", self.base_url);
        self.get_with_retry(&url).await
    }

    pub async fn file_detail(&self, modpack_id: &str, file_id: &str) -> Result<FileDetail> {
        self.require_enabled()?;
        let url = format!("{}/modpack/{modpack_id}/file/{file_id}", self.base_url);
        self.get_with_retry(&url).await
    }

    pub async fn description(&self, modpack_id: &str) -> Result<ModpackDescription> {
        self.require_enabled()?;
        let url = format!("{}/modpack/{modpack_id}/description", self.base_url);
        self.get_with_retry(&url).await
    }

    pub async fn changelog(&self, modpack_id: &str, file_id: &str) -> Result<Changelog> {
        self.require_enabled()?;
        let url = format!("{}/modpack/{modpack_id}/file/{file_id}/changelog", self.base_url);
        self.get_with_retry(&url).await
    }

    /// The most recently published file for a modpack, used by `mods(id)` (latest).
    pub async fn latest_file(&self, modpack_id: &str) -> Result<FileDetail> {
        self.require_enabled()?;
        let url = format!("{}/modpack/{modpack_id}/file/latest", self.base_url);
        self.get_with_retry(&url).await
    }

    pub async fn mod_metadata_batch(&self, project_ids: &[String]) -> Result<Vec<ModMetadata>> {
        self.require_enabled()?;
        if project_ids.len() > MOD_METADATA_BATCH_LIMIT {
            return Err(AppError::InvalidRequest {
                message: format!("batch of {} exceeds the {} project limit", project_ids.len(), MOD_METADATA_BATCH_LIMIT),
            });
        }
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/mods?ids={}", self.base_url, project_ids.join(","));
        self.get_with_retry(&url).await
    }

    pub async fn mod_file_download(&self, project_id: u64, file_id: u64) -> Result<ModFileDownload> {
        self.require_enabled()?;
        let url = format!("{}/mods/{project_id}/files/{file_id}", self.base_url);
        self.get_with_retry(&url).await
    }

    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.require_enabled()?;
        let response = self
            .apply_auth(self.http.get(url))
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        if let Some(len) = response.content_length() {
            if len > DOWNLOAD_SIZE_CEILING {
                return Err(AppError::DownloadTooLarge {
                    message: format!("upstream reports {len} bytes, ceiling is {DOWNLOAD_SIZE_CEILING}"),
                });
            }
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = dest.with_extension("download-tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > DOWNLOAD_SIZE_CEILING {
                drop(file);
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(AppError::DownloadTooLarge {
                    message: format!("download exceeded the {DOWNLOAD_SIZE_CEILING} byte ceiling"),
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        tokio::fs::rename(&tmp_path, dest).await?;
        Ok(written)
    }
}

fn urlencoding_query(query: &str) -> String {
    query.chars().map(|c| if c == ' ' { "%20".to_string() } else { c.to_string() }).collect()
}
