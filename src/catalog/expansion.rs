//! Mod list expansion: turns a raw [`FileDetail`] into the catalog-enriched
//! [`ModEntry`] list the API promises, by downloading the modpack archive,
//! reading its `manifest.json`, and joining each `projectID` against
//! [`CatalogClient::mod_metadata_batch`]. Grounded on the archive
//! download/extract flow in `provisioning::orchestrator`, reused here for a
//! read-only listing rather than a full server provision.

use crate::catalog::client::CatalogClient;
use crate::catalog::types::{FileDetail, ModEntry, ModMetadata};
use crate::error::{AppError, Result};
use crate::provisioning::manifest::ModpackManifest;
use std::collections::HashMap;
use std::path::Path;

const METADATA_BATCH_SIZE: usize = 100;

pub async fn expand_mod_list(catalog: &CatalogClient, file_detail: &FileDetail) -> Result<Vec<ModEntry>> {
    let work_dir = tempfile::Builder::new().prefix("hearthd-modlist-").tempdir().map_err(AppError::internal)?;
    let archive_path = work_dir.path().join("modpack.zip");
    catalog.download(&file_detail.download_url, &archive_path).await?;

    let manifest_bytes = read_manifest_from_zip(&archive_path).await?;
    let manifest = ModpackManifest::parse(&manifest_bytes)?;

    let project_ids: Vec<String> = manifest.files.iter().map(|file| file.project_id.to_string()).collect();
    let mut metadata_by_id: HashMap<String, ModMetadata> = HashMap::with_capacity(project_ids.len());
    for chunk in project_ids.chunks(METADATA_BATCH_SIZE) {
        let batch = catalog.mod_metadata_batch(chunk).await?;
        metadata_by_id.extend(batch.into_iter().map(|meta| (meta.project_id.clone(), meta)));
    }

    let entries = manifest
        .files
        .into_iter()
        .map(|file| {
            let key = file.project_id.to_string();
            let meta = metadata_by_id.get(&key);
            ModEntry {
                project_id: file.project_id,
                file_id: file.file_id,
                required: file.required,
                name: meta.map(|m| m.name.clone()).unwrap_or_else(|| key.clone()),
                slug: meta.map(|m| m.slug.clone()).unwrap_or_default(),
                summary: meta.map(|m| m.summary.clone()).unwrap_or_default(),
                logo: meta.and_then(|m| m.icon_url.clone()),
                website_url: meta.and_then(|m| m.website_url.clone()),
            }
        })
        .collect();
    Ok(entries)
}

async fn read_manifest_from_zip(archive_path: &Path) -> Result<Vec<u8>> {
    let archive_path = archive_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let file = std::fs::File::open(&archive_path).map_err(AppError::internal)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| AppError::ManifestInvalid {
            message: format!("not a valid archive: {e}"),
        })?;
        let mut entry = archive.by_name("manifest.json").map_err(|_| AppError::ManifestMissing {
            message: "archive has no manifest.json".to_string(),
        })?;
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut bytes).map_err(AppError::internal)?;
        Ok(bytes)
    })
    .await
    .map_err(AppError::internal)?
}
