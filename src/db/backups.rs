//! Backup record persistence, used exclusively by [`crate::backup::BackupManager`].

use super::Database;
use crate::error::{AppError, Result};
use crate::models::{BackupRecord, BackupStatus, BackupType};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct BackupRow {
    id: String,
    server_id: String,
    name: String,
    status: String,
    archive_path: Option<String>,
    size_bytes: Option<i64>,
    backup_type: String,
    created_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl BackupRow {
    fn into_record(self) -> Result<BackupRecord> {
        Ok(BackupRecord {
            id: Uuid::parse_str(&self.id)?,
            server_id: Uuid::parse_str(&self.server_id)?,
            name: self.name,
            status: self.status.parse::<BackupStatus>()?,
            archive_path: self.archive_path,
            size_bytes: self.size_bytes,
            backup_type: self.backup_type.parse::<BackupType>()?,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

impl Database {
    pub async fn insert_backup(&self, record: &BackupRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO backups (id, server_id, name, status, archive_path, size_bytes, backup_type, created_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.server_id.to_string())
        .bind(&record.name)
        .bind(record.status.to_string())
        .bind(&record.archive_path)
        .bind(record.size_bytes)
        .bind(record.backup_type.to_string())
        .bind(record.created_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_backup_status(
        &self,
        id: Uuid,
        status: BackupStatus,
        archive_path: Option<String>,
        size_bytes: Option<i64>,
        completed_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE backups SET status = ?, archive_path = ?, size_bytes = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(archive_path)
        .bind(size_bytes)
        .bind(completed_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_backups(&self, server_id: Uuid) -> Result<Vec<BackupRecord>> {
        let rows: Vec<BackupRow> = sqlx::query_as(
            "SELECT * FROM backups WHERE server_id = ? ORDER BY created_at DESC",
        )
        .bind(server_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BackupRow::into_record).collect()
    }

    pub async fn get_backup(&self, id: Uuid) -> Result<BackupRecord> {
        let row: Option<BackupRow> = sqlx::query_as("SELECT * FROM backups WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| AppError::NotFound {
            message: format!("backup {id} not found"),
        })?
        .into_record()
    }

    pub async fn delete_backup(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM backups WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound {
                message: format!("backup {id} not found"),
            });
        }
        Ok(())
    }
}
