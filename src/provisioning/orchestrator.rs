//! Provisioning Orchestrator (C8): drives "create a server from a modpack"
//! end to end, in a detached background task, reporting progress through
//! the Progress Channel (C10). Grounded on the download/extract/install
//! pipeline in `hostd::modpack_installer::ModpackInstaller`, replacing its
//! exception-style control flow with a linear `Result` pipeline per
//! Design Notes ("Exception-like control flow in provisioning").

use crate::catalog::client::CatalogClient;
use crate::core::progress_channel::{ProgressChannel, ProgressEvent};
use crate::core::server_registry::{NewServerRequest, ServerRegistry};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{GameOptions, ModpackRecord, ProvisioningSession, StorageKind};
use crate::provisioning::manifest::ModpackManifest;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

const MOD_DOWNLOAD_CONCURRENCY: usize = 5;

pub struct CreateServerFromModpackRequest {
    pub display_name: String,
    pub description: Option<String>,
    pub catalog_modpack_id: String,
    pub catalog_file_id: String,
    pub requested_port: u16,
    pub memory_mb: u32,
    pub jvm_opts: Option<String>,
    pub storage_path: Option<String>,
}

pub struct ProvisioningOrchestrator {
    catalog: Arc<CatalogClient>,
    registry: Arc<ServerRegistry>,
    progress: Arc<ProgressChannel>,
    db: Arc<Database>,
    servers_base_dir: PathBuf,
}

impl ProvisioningOrchestrator {
    pub fn new(catalog: Arc<CatalogClient>, registry: Arc<ServerRegistry>, progress: Arc<ProgressChannel>, db: Arc<Database>, servers_base_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            registry,
            progress,
            db,
            servers_base_dir,
        })
    }

    /// Returns immediately with a session id; the pipeline runs detached.
    pub async fn start(self: &Arc<Self>, request: CreateServerFromModpackRequest) -> Uuid {
        let session_id = self.progress.open_session().await;
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.run(session_id, request).await {
                tracing::warn!(%session_id, error = %err, "provisioning session failed");
                this.progress
                    .publish(
                        session_id,
                        ProgressEvent::Error {
                            session_id,
                            message: err.message(),
                        },
                    )
                    .await;
            }
        });
        session_id
    }

    async fn emit(&self, session_id: Uuid, step: &str, percent: u8, message: &str, current: Option<u32>, total: Option<u32>) {
        self.progress
            .publish(
                session_id,
                ProgressEvent::Progress(ProvisioningSession {
                    session_id,
                    server_id: None,
                    current_step: step.to_string(),
                    percent,
                    message: message.to_string(),
                    current,
                    total,
                }),
            )
            .await;
    }

    async fn run(&self, session_id: Uuid, request: CreateServerFromModpackRequest) -> Result<()> {
        // 1. fetching — file detail and modpack metadata in parallel.
        self.emit(session_id, "fetching", 5, "fetching modpack metadata", None, None).await;
        let (file_detail, modpack_meta) = tokio::join!(
            self.catalog.file_detail(&request.catalog_modpack_id, &request.catalog_file_id),
            self.catalog.modpack_meta(&request.catalog_modpack_id),
        );
        let file_detail = file_detail?;
        let modpack_meta = modpack_meta?;

        // 2. downloading — the modpack archive itself.
        self.emit(session_id, "downloading", 15, "downloading modpack archive", None, None).await;
        let work_dir_guard = tempfile::Builder::new().prefix("hearthd-provision-").tempdir().map_err(AppError::internal)?;
        let work_dir = work_dir_guard.path().to_path_buf();
        let archive_path = work_dir.join("modpack.zip");
        self.catalog.download(&file_detail.download_url, &archive_path).await?;

        // 3. extracting.
        self.emit(session_id, "extracting", 35, "extracting archive", None, None).await;
        let extract_dir = work_dir.join("extracted");
        extract_zip(&archive_path, &extract_dir).await?;

        // 4. parsing.
        self.emit(session_id, "parsing", 45, "parsing manifest", None, None).await;
        let manifest_bytes = tokio::fs::read(extract_dir.join("manifest.json")).await.map_err(|_| AppError::ManifestMissing {
            message: "extracted archive has no manifest.json".to_string(),
        })?;
        let manifest = ModpackManifest::parse(&manifest_bytes)?;
        let classified = manifest.classify_loader()?;

        // 5. database — upsert the ModpackRecord.
        self.emit(session_id, "database", 55, "recording modpack metadata", None, None).await;
        let modpack_record = ModpackRecord {
            catalog_id: request.catalog_modpack_id.clone(),
            name: modpack_meta.name.clone(),
            authors: serde_json::to_string(&modpack_meta.authors).map_err(AppError::internal)?,
            game_version: manifest.minecraft.version.clone(),
            modloader: classified.engine.as_str().to_string(),
            download_url: Some(file_detail.download_url.clone()),
            icon_url: modpack_meta.icon_url.clone(),
            updated_at: Utc::now(),
        };

        // 6. port.
        self.emit(session_id, "port", 48, "assigning port", None, None).await;
        let port = self.registry.find_available_port(request.requested_port).await?;

        // 7. creating — insert the ServerRecord.
        self.emit(session_id, "creating", 50, "creating server record", None, None).await;
        let storage_path = request
            .storage_path
            .clone()
            .unwrap_or_else(|| self.servers_base_dir.join(Uuid::new_v4().to_string()).to_string_lossy().into_owned());
        let server_dir = PathBuf::from(&storage_path);
        tokio::fs::create_dir_all(&server_dir).await?;

        let record = self
            .registry
            .create(NewServerRequest {
                name: request.display_name.clone(),
                description: request.description.clone(),
                engine: classified.engine,
                version: classified.server_version.clone(),
                requested_port: port,
                memory_mb: request.memory_mb,
                jvm_opts: request.jvm_opts.clone().unwrap_or_default(),
                auto_start: false,
                backup_schedule_enabled: false,
                storage_kind: StorageKind::BindPath,
                storage_path,
                game_options: GameOptions::default(),
                modpack_id: Some(request.catalog_modpack_id.clone()),
            })
            .await?;

        // db write is best-effort here; the session can still succeed if
        // the catalog metadata cache write fails, the ServerRecord is the
        // durable artifact the caller actually needs.
        if let Err(err) = self.db.upsert_modpack(&modpack_record).await {
            tracing::warn!(%session_id, error = %err, "failed to cache modpack metadata");
        }

        // 8. copying — overrides into the server directory.
        self.emit(session_id, "copying", 55, "copying overrides", None, None).await;
        let overrides_dir = extract_dir.join(manifest.overrides_folder());
        if tokio::fs::try_exists(&overrides_dir).await.unwrap_or(false) {
            copy_dir_recursive(&overrides_dir, &server_dir).await?;
        }
        tokio::fs::write(server_dir.join("modpack-manifest.json"), &manifest_bytes).await?;

        // 9. downloading-mods.
        let total = manifest.files.len() as u32;
        self.emit(session_id, "downloading-mods", 60, "downloading mods", Some(0), Some(total)).await;
        let succeeded = self.download_mods(session_id, &manifest.files, &server_dir, total).await;
        if total > 0 && succeeded == 0 {
            return Err(AppError::UpstreamUnavailable {
                message: "every mod in the modpack failed to download".to_string(),
            });
        }

        // 10. cleanup. `work_dir_guard` is otherwise held for the rest of
        // `run()` so every earlier `?` exit still removes the directory on
        // drop; dropping it explicitly here just makes the success path tidy
        // up promptly instead of waiting for the function to return.
        self.emit(session_id, "cleanup", 95, "cleaning up temporary files", None, None).await;
        drop(work_dir_guard);

        // 11. complete.
        self.emit(session_id, "complete", 100, "provisioning complete", None, None).await;
        self.progress
            .publish(
                session_id,
                ProgressEvent::Complete {
                    session_id,
                    server_id: record.id,
                },
            )
            .await;
        Ok(())
    }

    async fn download_mods(&self, session_id: Uuid, files: &[crate::provisioning::manifest::ManifestFile], server_dir: &Path, total: u32) -> u32 {
        let mods_dir = server_dir.join("mods");
        let _ = tokio::fs::create_dir_all(&mods_dir).await;
        let semaphore = Arc::new(Semaphore::new(MOD_DOWNLOAD_CONCURRENCY));
        let mut tasks = tokio::task::JoinSet::new();

        for file in files {
            let permit_holder = semaphore.clone();
            let catalog = self.catalog.clone();
            let mods_dir = mods_dir.clone();
            let project_id = file.project_id;
            let file_id = file.file_id;
            tasks.spawn(async move {
                let _permit = permit_holder.acquire_owned().await.expect("semaphore closed");
                let detail = catalog.mod_file_download(project_id, file_id).await?;
                let dest = mods_dir.join(&detail.file_name);
                catalog.download(&detail.download_url, &dest).await?;
                Ok::<(), AppError>(())
            });
        }

        let mut done = 0u32;
        let mut succeeded = 0u32;
        while let Some(result) = tasks.join_next().await {
            done += 1;
            match result {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(err)) => tracing::warn!(%session_id, error = %err, "mod download failed"),
                Err(err) => tracing::warn!(%session_id, error = %err, "mod download task panicked"),
            }
            let percent = 60 + (done as f64 / total.max(1) as f64 * 20.0).floor() as u8;
            self.emit(session_id, "downloading-mods", percent, "downloading mods", Some(done), Some(total)).await;
        }
        succeeded
    }
}

async fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let archive_path = archive_path.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&archive_path).map_err(AppError::internal)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| AppError::ManifestInvalid {
            message: format!("not a valid archive: {e}"),
        })?;
        archive.extract(&dest).map_err(|e| AppError::ManifestInvalid {
            message: format!("archive extraction failed: {e}"),
        })?;
        Ok(())
    })
    .await
    .map_err(AppError::internal)??;
    Ok(())
}

fn copy_dir_recursive<'a>(src: &'a Path, dst: &'a Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dst).await?;
        let mut entries = tokio::fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());
            if file_type.is_dir() {
                copy_dir_recursive(&src_path, &dst_path).await?;
            } else {
                tokio::fs::copy(&src_path, &dst_path).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_dir_recursive_preserves_tree() {
        let src = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(src.path().join("config")).await.unwrap();
        tokio::fs::write(src.path().join("config/foo.cfg"), b"x=1").await.unwrap();

        let dst = tempfile::tempdir().unwrap();
        copy_dir_recursive(src.path(), dst.path()).await.unwrap();

        let copied = tokio::fs::read(dst.path().join("config/foo.cfg")).await.unwrap();
        assert_eq!(copied, b"x=1");
    }
}
