//! Wire types returned by the catalog client, modeled on the response
//! shapes in `hostd::external_apis::modrinth`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSearchHit {
    pub modpack_id: String,
    pub name: String,
    pub summary: String,
    pub icon_url: Option<String>,
    pub downloads: u64,
    pub game_versions: Vec<String>,
    pub modloaders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSearchResponse {
    pub hits: Vec<CatalogSearchHit>,
    pub total_hits: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModpackMeta {
    pub modpack_id: String,
    pub name: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModpackFile {
    pub file_id: String,
    pub modpack_id: String,
    pub game_version: String,
    pub modloader: String,
    pub version_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDetail {
    pub file_id: String,
    pub modpack_id: String,
    pub download_url: String,
    pub sha256: Option<String>,
    pub size_bytes: u64,
    pub mod_entries: Vec<ModFileRef>,
}

/// A mod reference as the catalog wire format reports it: no metadata, just
/// enough to locate the file. The `mods(file)`/`mods(latest)` operations
/// expand this into a full [`ModEntry`] by downloading the modpack archive
/// and joining its manifest against [`crate::catalog::client::CatalogClient::mod_metadata_batch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModFileRef {
    pub project_id: String,
    pub file_name: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModMetadata {
    pub project_id: String,
    pub name: String,
    pub slug: String,
    pub summary: String,
    pub icon_url: Option<String>,
    pub website_url: Option<String>,
}

/// A manifest entry enriched with catalog metadata; the shape returned by
/// `GET /modpacks/:id/files/:fileId/mods` and `GET /modpacks/:id/mods`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModEntry {
    pub project_id: u64,
    pub file_id: u64,
    pub required: bool,
    pub name: String,
    pub slug: String,
    pub summary: String,
    pub logo: Option<String>,
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModpackDescription {
    pub modpack_id: String,
    pub body_markdown: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Changelog {
    pub file_id: String,
    pub body_markdown: String,
}

/// Download coordinates for one mod file referenced by a modpack manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModFileDownload {
    pub project_id: String,
    pub file_id: String,
    pub file_name: String,
    pub download_url: String,
    pub sha1: Option<String>,
}
