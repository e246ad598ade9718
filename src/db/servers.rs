//! Server record persistence. The only writer of the `servers` table;
//! [`crate::core::server_registry::ServerRegistry`] is the only caller.

use super::Database;
use crate::error::{AppError, Result};
use crate::models::{EngineFamily, GameOptions, ServerProperty, ServerRecord, ServerState, StorageKind};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct ServerRow {
    id: String,
    name: String,
    description: Option<String>,
    engine: String,
    version: String,
    port: i64,
    memory_mb: i64,
    jvm_opts: String,
    auto_start: bool,
    backup_schedule_enabled: bool,
    state: String,
    storage_kind: String,
    storage_path: String,
    process_handle: Option<String>,
    game_options: String,
    modpack_id: Option<String>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl ServerRow {
    fn into_record(self) -> Result<ServerRecord> {
        Ok(ServerRecord {
            id: Uuid::parse_str(&self.id)?,
            name: self.name,
            description: self.description,
            engine: self.engine.parse::<EngineFamily>()?,
            version: self.version,
            port: self.port as u16,
            memory_mb: self.memory_mb as u32,
            jvm_opts: self.jvm_opts,
            auto_start: self.auto_start,
            backup_schedule_enabled: self.backup_schedule_enabled,
            state: self.state.parse::<ServerState>()?,
            storage_kind: self.storage_kind.parse::<StorageKind>()?,
            storage_path: self.storage_path,
            process_handle: self.process_handle,
            game_options: serde_json::from_str(&self.game_options)
                .map_err(|e| AppError::internal(e))?,
            modpack_id: self.modpack_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl Database {
    pub async fn insert_server(&self, record: &ServerRecord) -> Result<()> {
        let game_options = serde_json::to_string(&record.game_options).map_err(AppError::internal)?;
        let result = sqlx::query(
            r#"INSERT INTO servers
                (id, name, description, engine, version, port, memory_mb, jvm_opts,
                 auto_start, backup_schedule_enabled, state, storage_kind, storage_path,
                 process_handle, game_options, modpack_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.engine.as_str())
        .bind(&record.version)
        .bind(record.port as i64)
        .bind(record.memory_mb as i64)
        .bind(&record.jvm_opts)
        .bind(record.auto_start)
        .bind(record.backup_schedule_enabled)
        .bind(record.state.to_string())
        .bind(record.storage_kind.to_string())
        .bind(&record.storage_path)
        .bind(&record.process_handle)
        .bind(game_options)
        .bind(&record.modpack_id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let message = db_err.message().to_string();
                if message.contains("servers.name") {
                    Err(AppError::ConflictName {
                        message: format!("server name '{}' already exists", record.name),
                    })
                } else if message.contains("servers.port") {
                    Err(AppError::ConflictPort {
                        message: format!("port {} already in use", record.port),
                    })
                } else {
                    Err(AppError::ConflictName {
                        message,
                    })
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    pub async fn get_server(&self, id: Uuid) -> Result<ServerRecord> {
        let row: Option<ServerRow> = sqlx::query_as("SELECT * FROM servers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| AppError::NotFound {
            message: format!("server {id} not found"),
        })?
        .into_record()
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        let rows: Vec<ServerRow> = sqlx::query_as("SELECT * FROM servers ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ServerRow::into_record).collect()
    }

    pub async fn list_reserved_ports(&self) -> Result<Vec<u16>> {
        let rows = sqlx::query("SELECT port FROM servers")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("port") as u16).collect())
    }

    pub async fn update_server_state(&self, id: Uuid, state: ServerState, process_handle: Option<String>) -> Result<()> {
        sqlx::query("UPDATE servers SET state = ?, process_handle = ?, updated_at = ? WHERE id = ?")
            .bind(state.to_string())
            .bind(process_handle)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_server(&self, id: Uuid, patch: &crate::core::server_registry::ServerPatch) -> Result<()> {
        let existing = self.get_server(id).await?;
        let name = patch.name.clone().unwrap_or(existing.name);
        let description = patch.description.clone().unwrap_or(existing.description);
        let memory_mb = patch.memory_mb.unwrap_or(existing.memory_mb);
        let jvm_opts = patch.jvm_opts.clone().unwrap_or(existing.jvm_opts);
        let auto_start = patch.auto_start.unwrap_or(existing.auto_start);
        let backup_schedule_enabled = patch.backup_schedule_enabled.unwrap_or(existing.backup_schedule_enabled);
        let game_options = patch.game_options.clone().unwrap_or(existing.game_options);
        let game_options_json = serde_json::to_string(&game_options).map_err(AppError::internal)?;

        let result = sqlx::query(
            r#"UPDATE servers SET name = ?, description = ?, memory_mb = ?, jvm_opts = ?,
                 auto_start = ?, backup_schedule_enabled = ?, game_options = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&name)
        .bind(&description)
        .bind(memory_mb as i64)
        .bind(&jvm_opts)
        .bind(auto_start)
        .bind(backup_schedule_enabled)
        .bind(game_options_json)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(AppError::ConflictName {
                message: format!("server name '{name}' already exists"),
            }),
            Err(other) => Err(other.into()),
        }
    }

    pub async fn delete_server(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM servers WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                message: format!("server {id} not found"),
            });
        }
        Ok(())
    }

    pub async fn list_properties(&self, server_id: Uuid) -> Result<Vec<ServerProperty>> {
        let rows = sqlx::query("SELECT key, value FROM server_properties WHERE server_id = ? ORDER BY key")
            .bind(server_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ServerProperty {
                server_id,
                key: row.get("key"),
                value: row.get("value"),
            })
            .collect())
    }

    /// Replaces every custom property row for a server in one transaction,
    /// so a caller never observes a partially-applied set.
    pub async fn replace_properties(&self, server_id: Uuid, properties: &[ServerProperty]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM server_properties WHERE server_id = ?")
            .bind(server_id.to_string())
            .execute(&mut *tx)
            .await?;
        for prop in properties {
            sqlx::query("INSERT INTO server_properties (server_id, key, value) VALUES (?, ?, ?)")
                .bind(server_id.to_string())
                .bind(&prop.key)
                .bind(&prop.value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GameOptions;

    fn sample_record(name: &str, port: u16) -> ServerRecord {
        ServerRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            engine: EngineFamily::Vanilla,
            version: "1.20.4".to_string(),
            port,
            memory_mb: 2048,
            jvm_opts: String::new(),
            auto_start: false,
            backup_schedule_enabled: false,
            state: ServerState::Stopped,
            storage_kind: StorageKind::BindPath,
            storage_path: "/tmp/x".to_string(),
            process_handle: None,
            game_options: GameOptions::default(),
            modpack_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_then_fetch_round_trips() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let record = sample_record("alpha", 25565);
        db.insert_server(&record).await.unwrap();
        let fetched = db.get_server(record.id).await.unwrap();
        assert_eq!(fetched.name, "alpha");
        assert_eq!(fetched.port, 25565);
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.insert_server(&sample_record("alpha", 25565)).await.unwrap();
        let err = db.insert_server(&sample_record("alpha", 25566)).await.unwrap_err();
        assert_eq!(err.kind(), "ConflictName");
    }

    #[tokio::test]
    async fn duplicate_port_is_conflict() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.insert_server(&sample_record("alpha", 25565)).await.unwrap();
        let err = db.insert_server(&sample_record("beta", 25565)).await.unwrap_err();
        assert_eq!(err.kind(), "ConflictPort");
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let record = sample_record("alpha", 25565);
        db.insert_server(&record).await.unwrap();
        db.delete_server(record.id).await.unwrap();
        assert!(db.get_server(record.id).await.is_err());
    }

    #[tokio::test]
    async fn replace_properties_overwrites_the_full_set() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let record = sample_record("alpha", 25565);
        db.insert_server(&record).await.unwrap();

        db.replace_properties(
            record.id,
            &[
                ServerProperty { server_id: record.id, key: "view-distance".to_string(), value: "10".to_string() },
                ServerProperty { server_id: record.id, key: "spawn-protection".to_string(), value: "0".to_string() },
            ],
        )
        .await
        .unwrap();
        let props = db.list_properties(record.id).await.unwrap();
        assert_eq!(props.len(), 2);

        db.replace_properties(
            record.id,
            &[ServerProperty { server_id: record.id, key: "view-distance".to_string(), value: "32".to_string() }],
        )
        .await
        .unwrap();
        let props = db.list_properties(record.id).await.unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].value, "32");
    }
}
