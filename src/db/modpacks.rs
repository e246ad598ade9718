//! Modpack metadata cache, upserted once per provisioning run (C8 step `database`).

use super::Database;
use crate::error::{AppError, Result};
use crate::models::ModpackRecord;
use chrono::Utc;

#[derive(sqlx::FromRow)]
struct ModpackRow {
    catalog_id: String,
    name: String,
    authors: String,
    game_version: String,
    modloader: String,
    download_url: Option<String>,
    icon_url: Option<String>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<ModpackRow> for ModpackRecord {
    fn from(row: ModpackRow) -> Self {
        ModpackRecord {
            catalog_id: row.catalog_id,
            name: row.name,
            authors: row.authors,
            game_version: row.game_version,
            modloader: row.modloader,
            download_url: row.download_url,
            icon_url: row.icon_url,
            updated_at: row.updated_at,
        }
    }
}

impl Database {
    pub async fn upsert_modpack(&self, record: &ModpackRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO modpacks (catalog_id, name, authors, game_version, modloader, download_url, icon_url, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(catalog_id) DO UPDATE SET
                 name = excluded.name,
                 authors = excluded.authors,
                 game_version = excluded.game_version,
                 modloader = excluded.modloader,
                 download_url = excluded.download_url,
                 icon_url = excluded.icon_url,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&record.catalog_id)
        .bind(&record.name)
        .bind(&record.authors)
        .bind(&record.game_version)
        .bind(&record.modloader)
        .bind(&record.download_url)
        .bind(&record.icon_url)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_modpacks(&self) -> Result<Vec<ModpackRecord>> {
        let rows: Vec<ModpackRow> = sqlx::query_as("SELECT * FROM modpacks ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_modpack(&self, catalog_id: &str) -> Result<ModpackRecord> {
        let row: Option<ModpackRow> = sqlx::query_as("SELECT * FROM modpacks WHERE catalog_id = ?")
            .bind(catalog_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Into::into).ok_or_else(|| AppError::NotFound {
            message: format!("modpack {catalog_id} not found"),
        })
    }
}
