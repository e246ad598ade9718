//! Structured logging bootstrap. Trimmed from `hostd::core::logging`'s
//! `LogConfig`/`LogFormat`/`LogOutput` to what this crate actually uses:
//! console output, optionally mirrored to a rolling file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub file_path: Option<std::path::PathBuf>,
}

impl LogConfig {
    pub fn from_level(level: &str) -> Self {
        Self {
            level: level.to_string(),
            format: LogFormat::Pretty,
            file_path: Some(std::path::PathBuf::from("logs/hearthd.log")),
        }
    }
}

pub fn initialize_logging(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_target(true);

    let registry = tracing_subscriber::registry().with(filter).with(console_layer);

    if let Some(path) = config.file_path {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).context("failed to create log directory")?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let file_layer = fmt::layer().with_ansi(false).with_writer(file);
        registry.with(file_layer).try_init().ok();
    } else {
        registry.try_init().ok();
    }

    Ok(())
}
