//! SQLite persistence layer. One pool, a handful of narrow query modules.
//! Grounded on `hostd::database::DatabaseManager`.

pub mod backups;
pub mod modpacks;
pub mod servers;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("invalid DATABASE_URL")?
            .create_if_missing(true);
        // A single connection keeps `sqlite::memory:` usable in tests; a real
        // on-disk database still benefits from a small pool.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 10 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to connect to sqlite database")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        Ok(Self { pool })
    }
}
