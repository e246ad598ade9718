//! Backup Manager (C16): archives a server's storage directory into a zip
//! file and restores it back out. Grounded on `hostd::backup_manager::BackupManager`
//! for the create/restore shape, trimmed to this crate's single compression
//! format and closed `BackupStatus`/`BackupType` enums, and on
//! `hostd::core::scheduler::TaskScheduler` for the cron-driven loop.

use crate::core::server_registry::ServerRegistry;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{BackupRecord, BackupStatus, BackupType};
use chrono::Utc;
use cron::Schedule;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub struct BackupManager {
    db: Arc<Database>,
    registry: Arc<ServerRegistry>,
    backups_base_dir: PathBuf,
}

impl BackupManager {
    pub fn new(db: Arc<Database>, registry: Arc<ServerRegistry>, backups_base_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            db,
            registry,
            backups_base_dir,
        })
    }

    pub async fn list(&self, server_id: Uuid) -> Result<Vec<BackupRecord>> {
        self.db.list_backups(server_id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<BackupRecord> {
        self.db.get_backup(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let record = self.db.get_backup(id).await?;
        if let Some(path) = &record.archive_path {
            let _ = tokio::fs::remove_file(path).await;
        }
        self.db.delete_backup(id).await
    }

    /// Inserts a `Pending` row, then performs the archive synchronously and
    /// updates the row to its terminal status. Unlike the teacher's
    /// fire-and-forget `tokio::spawn`, callers that need async behavior
    /// should spawn this themselves; a server's storage directory is small
    /// enough that archiving inline keeps status transitions observable.
    pub async fn create(self: &Arc<Self>, server_id: Uuid, name: String, backup_type: BackupType) -> Result<BackupRecord> {
        let server = self.registry.get(server_id).await?;
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let record = BackupRecord {
            id,
            server_id,
            name,
            status: BackupStatus::Pending,
            archive_path: None,
            size_bytes: None,
            backup_type,
            created_at,
            completed_at: None,
        };
        self.db.insert_backup(&record).await?;
        self.db.update_backup_status(id, BackupStatus::InProgress, None, None, None).await?;

        let archive_path = self.backups_base_dir.join(format!("{id}.zip"));
        tokio::fs::create_dir_all(&self.backups_base_dir).await?;
        let server_dir = PathBuf::from(&server.storage_path);

        match archive_server_dir(&server_dir, &archive_path).await {
            Ok(size_bytes) => {
                let completed_at = Utc::now();
                self.db
                    .update_backup_status(id, BackupStatus::Completed, Some(archive_path.to_string_lossy().into_owned()), Some(size_bytes as i64), Some(completed_at))
                    .await?;
            }
            Err(err) => {
                tracing::error!(backup_id = %id, error = %err, "backup archive failed");
                self.db.update_backup_status(id, BackupStatus::Failed, None, None, None).await?;
                return Err(err);
            }
        }

        self.db.get_backup(id).await
    }

    /// Staged restore: extract into `{storage_path}.restore-tmp` first, then
    /// atomically rename over the live directory once extraction succeeds.
    /// Never overwrites files in place before the archive is known-good.
    pub async fn restore(&self, id: Uuid) -> Result<()> {
        let backup = self.db.get_backup(id).await?;
        if backup.status != BackupStatus::Completed {
            return Err(AppError::InvalidRequest {
                message: format!("backup {id} is not completed, cannot restore"),
            });
        }
        let archive_path = backup.archive_path.ok_or_else(|| AppError::Internal {
            message: "completed backup has no archive path".to_string(),
        })?;

        let server = self.registry.get(backup.server_id).await?;
        let live_dir = PathBuf::from(&server.storage_path);
        let staging_dir = live_dir.with_extension("restore-tmp");
        if tokio::fs::try_exists(&staging_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&staging_dir).await?;
        }

        extract_archive(&PathBuf::from(&archive_path), &staging_dir).await?;

        if tokio::fs::try_exists(&live_dir).await.unwrap_or(false) {
            let displaced = live_dir.with_extension("pre-restore-tmp");
            if tokio::fs::try_exists(&displaced).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(&displaced).await?;
            }
            tokio::fs::rename(&live_dir, &displaced).await?;
            tokio::fs::rename(&staging_dir, &live_dir).await?;
            tokio::fs::remove_dir_all(&displaced).await?;
        } else {
            tokio::fs::rename(&staging_dir, &live_dir).await?;
        }

        Ok(())
    }
}

async fn archive_server_dir(server_dir: &Path, archive_path: &Path) -> Result<u64> {
    let server_dir = server_dir.to_path_buf();
    let archive_path = archive_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<u64> {
        let file = std::fs::File::create(&archive_path).map_err(AppError::internal)?;
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        add_dir_recursive(&mut zip, &server_dir, &server_dir, options)?;
        zip.finish().map_err(AppError::internal)?;
        let size = std::fs::metadata(&archive_path).map_err(AppError::internal)?.len();
        Ok(size)
    })
    .await
    .map_err(AppError::internal)?
}

fn add_dir_recursive(zip: &mut ZipWriter<std::fs::File>, root: &Path, dir: &Path, options: FileOptions) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).map_err(AppError::internal)? {
        let entry = entry.map_err(AppError::internal)?;
        let path = entry.path();
        let relative = path.strip_prefix(root).map_err(AppError::internal)?;
        if path.is_dir() {
            add_dir_recursive(zip, root, &path, options)?;
        } else {
            zip.start_file(relative.to_string_lossy().into_owned(), options).map_err(AppError::internal)?;
            let bytes = std::fs::read(&path).map_err(AppError::internal)?;
            zip.write_all(&bytes).map_err(AppError::internal)?;
        }
    }
    Ok(())
}

async fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let archive_path = archive_path.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&archive_path).map_err(AppError::internal)?;
        let mut archive = zip::ZipArchive::new(file).map_err(AppError::internal)?;
        archive.extract(&dest).map_err(AppError::internal)?;
        Ok(())
    })
    .await
    .map_err(AppError::internal)??;
    Ok(())
}

/// Runs the cron-gated scheduling loop until cancelled. Only servers with
/// `backup_schedule_enabled` are eligible, independent of `auto_start`.
pub async fn run_scheduler(manager: Arc<BackupManager>, registry: Arc<ServerRegistry>, cron_expr: String, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<()> {
    let schedule = Schedule::from_str(&cron_expr).map_err(|e| AppError::InvalidRequest {
        message: format!("invalid BACKUP_CRON expression: {e}"),
    })?;

    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            return Err(AppError::InvalidRequest {
                message: "cron schedule has no upcoming occurrences".to_string(),
            });
        };
        let delay = (next - Utc::now()).to_std().unwrap_or(std::time::Duration::from_secs(60));

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return Ok(()),
        }

        let servers = registry.list().await?;
        for server in servers.into_iter().filter(|s| s.backup_schedule_enabled) {
            let manager = manager.clone();
            let name = format!("scheduled-{}", Utc::now().format("%Y%m%dT%H%M%S"));
            tokio::spawn(async move {
                if let Err(err) = manager.create(server.id, name, BackupType::Scheduled).await {
                    tracing::warn!(server_id = %server.id, error = %err, "scheduled backup failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::server_registry::NewServerRequest;
    use crate::models::{EngineFamily, GameOptions, StorageKind};

    async fn setup() -> (Arc<BackupManager>, Arc<ServerRegistry>, tempfile::TempDir) {
        let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
        let registry = Arc::new(ServerRegistry::new(db.clone()));
        let tmp = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(db, registry.clone(), tmp.path().join("backups"));
        (manager, registry, tmp)
    }

    #[tokio::test]
    async fn create_then_restore_round_trips_a_file() {
        let (manager, registry, tmp) = setup().await;
        let server_dir = tmp.path().join("server1");
        tokio::fs::create_dir_all(&server_dir).await.unwrap();
        tokio::fs::write(server_dir.join("server.properties"), b"motd=hi").await.unwrap();

        let server = registry
            .create(NewServerRequest {
                name: "alpha".to_string(),
                description: None,
                engine: EngineFamily::Vanilla,
                version: "1.20.4".to_string(),
                requested_port: 25565,
                memory_mb: 2048,
                jvm_opts: String::new(),
                auto_start: false,
                backup_schedule_enabled: false,
                storage_kind: StorageKind::BindPath,
                storage_path: server_dir.to_string_lossy().into_owned(),
                game_options: GameOptions::default(),
                modpack_id: None,
            })
            .await
            .unwrap();

        let backup = manager.create(server.id, "manual-1".to_string(), BackupType::Manual).await.unwrap();
        assert_eq!(backup.status, BackupStatus::Completed);

        tokio::fs::remove_file(server_dir.join("server.properties")).await.unwrap();
        manager.restore(backup.id).await.unwrap();

        let restored = tokio::fs::read(server_dir.join("server.properties")).await.unwrap();
        assert_eq!(restored, b"motd=hi");
    }

    #[tokio::test]
    async fn restore_rejects_incomplete_backup() {
        let (manager, _registry, _tmp) = setup().await;
        let record = BackupRecord {
            id: Uuid::new_v4(),
            server_id: Uuid::new_v4(),
            name: "x".to_string(),
            status: BackupStatus::Pending,
            archive_path: None,
            size_bytes: None,
            backup_type: BackupType::Manual,
            created_at: Utc::now(),
            completed_at: None,
        };
        manager.db.insert_backup(&record).await.unwrap();
        let err = manager.restore(record.id).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }
}
