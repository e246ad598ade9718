//! Centralized configuration, loaded from `.env` + environment variables.
//! Grounded on `hostd::core::guardian_config::GuardianConfig`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub servers_base_dir: PathBuf,
    pub host_servers_path: Option<PathBuf>,
    pub catalog_api_key: Option<String>,
    pub default_java_opts: String,
    pub backup_retention_days: u32,
    pub backup_cron: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7654".parse().expect("valid default addr"),
            database_url: "sqlite:hearthd.db".to_string(),
            servers_base_dir: PathBuf::from("data/servers"),
            host_servers_path: None,
            catalog_api_key: None,
            default_java_opts: String::new(),
            backup_retention_days: 14,
            backup_cron: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from `.env` (best effort) then environment variables, per spec.md section 6.
    pub fn load() -> Result<Self> {
        if dotenv::dotenv().is_ok() {
            tracing::info!("loaded .env file");
        }

        let mut config = Self::default();

        if let Ok(dir) = env::var("SERVERS_BASE_DIR") {
            config.servers_base_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("HOST_SERVERS_PATH") {
            config.host_servers_path = Some(PathBuf::from(path));
        }
        if let Ok(key) = env::var("CATALOG_API_KEY") {
            if !key.is_empty() {
                config.catalog_api_key = Some(key);
            }
        }
        if let Ok(opts) = env::var("DEFAULT_JAVA_OPTS") {
            config.default_java_opts = opts;
        }
        if let Ok(days) = env::var("BACKUP_RETENTION_DAYS") {
            config.backup_retention_days = days
                .parse()
                .context("invalid BACKUP_RETENTION_DAYS value")?;
        }
        if let Ok(cron_expr) = env::var("BACKUP_CRON") {
            if !cron_expr.is_empty() {
                config.backup_cron = Some(cron_expr);
            }
        }
        if let Ok(db_url) = env::var("DATABASE_URL") {
            config.database_url = db_url;
        }
        if let Ok(addr) = env::var("HEARTHD_BIND_ADDR") {
            config.bind_addr = addr.parse().context("invalid HEARTHD_BIND_ADDR")?;
        }
        if let Ok(level) = env::var("RUST_LOG") {
            config.log_level = level;
        }

        std::fs::create_dir_all(&config.servers_base_dir)
            .context("failed to create servers base directory")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup_retention_days == 0 {
            anyhow::bail!("BACKUP_RETENTION_DAYS must be greater than zero");
        }
        if let Some(expr) = &self.backup_cron {
            expr.parse::<cron::Schedule>()
                .context("invalid BACKUP_CRON expression")?;
        }
        Ok(())
    }
}
