//! Server Registry (C9) and Port Assigner. The durable source of truth for
//! server records; uniqueness is enforced through a single async mutex
//! critical section so concurrent creates cannot both succeed (spec.md
//! section 5, "Shared-resource policy"). Grounded on
//! `hostd::core::port_registry::PortRegistry` and `hostd::core::server_manager`.

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{GameOptions, ServerProperty, ServerRecord, ServerState};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const MIN_PORT: u16 = 1024;
const MAX_PORT: u16 = 65535;

pub struct NewServerRequest {
    pub name: String,
    pub description: Option<String>,
    pub engine: crate::models::EngineFamily,
    pub version: String,
    pub requested_port: u16,
    pub memory_mb: u32,
    pub jvm_opts: String,
    pub auto_start: bool,
    pub backup_schedule_enabled: bool,
    pub storage_kind: crate::models::StorageKind,
    pub storage_path: String,
    pub game_options: GameOptions,
    pub modpack_id: Option<String>,
}

/// Partial update for `update(id, patch)`; `None` fields are left unchanged.
/// Engine, version, and port are immutable through this operation — changing
/// them means re-provisioning, not patching a running record.
#[derive(Debug, Clone, Default)]
pub struct ServerPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub memory_mb: Option<u32>,
    pub jvm_opts: Option<String>,
    pub auto_start: Option<bool>,
    pub backup_schedule_enabled: Option<bool>,
    pub game_options: Option<GameOptions>,
}

pub struct ServerRegistry {
    db: Arc<Database>,
    // Serializes name/port uniqueness checks across concurrent creates.
    create_lock: Mutex<()>,
}

impl ServerRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            create_lock: Mutex::new(()),
        }
    }

    /// Scans upward from `requested` until a free port is found.
    pub async fn find_available_port(&self, requested: u16) -> Result<u16> {
        let reserved = self.db.list_reserved_ports().await?;
        let mut candidate = requested.max(MIN_PORT);
        loop {
            if candidate > MAX_PORT {
                return Err(AppError::InvalidRequest {
                    message: "no available ports above the requested value".to_string(),
                });
            }
            if !reserved.contains(&candidate) {
                return Ok(candidate);
            }
            candidate += 1;
        }
    }

    pub async fn create(&self, req: NewServerRequest) -> Result<ServerRecord> {
        let _guard = self.create_lock.lock().await;

        if req.name.trim().is_empty() {
            return Err(AppError::InvalidRequest {
                message: "server name must not be empty".to_string(),
            });
        }
        if !(MIN_PORT..=MAX_PORT).contains(&req.requested_port) {
            return Err(AppError::InvalidRequest {
                message: format!("port {} is outside {}..={}", req.requested_port, MIN_PORT, MAX_PORT),
            });
        }

        let now = Utc::now();
        let record = ServerRecord {
            id: Uuid::new_v4(),
            name: req.name,
            description: req.description,
            engine: req.engine,
            version: req.version,
            port: req.requested_port,
            memory_mb: req.memory_mb,
            jvm_opts: req.jvm_opts,
            auto_start: req.auto_start,
            backup_schedule_enabled: req.backup_schedule_enabled,
            state: ServerState::Stopped,
            storage_kind: req.storage_kind,
            storage_path: req.storage_path,
            process_handle: None,
            game_options: req.game_options,
            modpack_id: req.modpack_id,
            created_at: now,
            updated_at: now,
        };

        // insert_server maps sqlite unique-constraint violations to
        // ConflictName/ConflictPort; the lock above just prevents two
        // concurrent callers from both passing an earlier availability
        // check and racing to this atomic insert.
        self.db.insert_server(&record).await?;
        Ok(record)
    }

    pub async fn get(&self, id: Uuid) -> Result<ServerRecord> {
        self.db.get_server(id).await
    }

    pub async fn list(&self) -> Result<Vec<ServerRecord>> {
        self.db.list_servers().await
    }

    /// Authoritative state mutation; only [`crate::core::process_manager::ProcessSupervisor`]
    /// and the provisioning orchestrator call this.
    pub async fn set_state(&self, id: Uuid, state: ServerState, process_handle: Option<String>) -> Result<()> {
        tracing::info!(server_id = %id, ?state, "server state transition");
        self.db.update_server_state(id, state, process_handle).await
    }

    pub async fn update(&self, id: Uuid, patch: ServerPatch) -> Result<ServerRecord> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(AppError::InvalidRequest {
                    message: "server name must not be empty".to_string(),
                });
            }
        }
        self.db.update_server(id, &patch).await?;
        self.db.get_server(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<ServerRecord> {
        let record = self.db.get_server(id).await?;
        self.db.delete_server(id).await?;
        Ok(record)
    }

    /// Custom `server.properties` rows co-owned by a record (spec.md §3,
    /// `ServerProperty`), layered on top of the typed `GameOptions` fields
    /// by the Config Writer at each start.
    pub async fn list_properties(&self, id: Uuid) -> Result<Vec<ServerProperty>> {
        self.db.get_server(id).await?;
        self.db.list_properties(id).await
    }

    pub async fn set_properties(&self, id: Uuid, properties: Vec<ServerProperty>) -> Result<Vec<ServerProperty>> {
        self.db.get_server(id).await?;
        for prop in &properties {
            if prop.key.trim().is_empty() {
                return Err(AppError::InvalidRequest {
                    message: "property key must not be empty".to_string(),
                });
            }
        }
        self.db.replace_properties(id, &properties).await?;
        self.db.list_properties(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EngineFamily, StorageKind};

    async fn registry() -> ServerRegistry {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        ServerRegistry::new(Arc::new(db))
    }

    fn req(name: &str, port: u16) -> NewServerRequest {
        NewServerRequest {
            name: name.to_string(),
            description: None,
            engine: EngineFamily::Vanilla,
            version: "1.20.4".to_string(),
            requested_port: port,
            memory_mb: 2048,
            jvm_opts: String::new(),
            auto_start: false,
            backup_schedule_enabled: false,
            storage_kind: StorageKind::BindPath,
            storage_path: "/tmp/alpha".to_string(),
            game_options: GameOptions::default(),
            modpack_id: None,
        }
    }

    #[tokio::test]
    async fn port_scan_skips_occupied_single() {
        let reg = registry().await;
        reg.create(req("alpha", 25565)).await.unwrap();
        let port = reg.find_available_port(25565).await.unwrap();
        assert_eq!(port, 25566);
    }

    #[tokio::test]
    async fn port_scan_skips_occupied_run() {
        let reg = registry().await;
        for (i, port) in (25565..=25570).enumerate() {
            reg.create(req(&format!("s{i}"), port)).await.unwrap();
        }
        let port = reg.find_available_port(25565).await.unwrap();
        assert_eq!(port, 25571);
    }

    #[tokio::test]
    async fn name_conflict_surfaces() {
        let reg = registry().await;
        reg.create(req("alpha", 25565)).await.unwrap();
        let err = reg.create(req("alpha", 25566)).await.unwrap_err();
        assert_eq!(err.kind(), "ConflictName");
    }
}
