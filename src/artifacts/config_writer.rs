//! Config Writer (C5): renders `server.properties`, `eula.txt`, and (for
//! Forge/NeoForge) `user_jvm_args.txt` into a server's storage directory.
//! Grounded on the properties-file templating in
//! `hostd::core::guardian_config`, adapted to the game-facing files a
//! vanilla/modded server reads on boot rather than the control plane's own
//! configuration.

use crate::error::Result;
use crate::models::{EngineFamily, GameOptions, ServerProperty, ServerRecord};

const REMOTE_CONSOLE_PORT_OFFSET: u16 = 10000;
const REMOTE_CONSOLE_PASSWORD: &str = "hearth-managed";

pub struct ConfigWriter;

impl ConfigWriter {
    /// `overrides` are the custom key/value rows from
    /// [`crate::core::server_registry::ServerRegistry::list_properties`];
    /// they take precedence over the typed `GameOptions` defaults below and
    /// any key not already present is appended verbatim.
    pub fn render_server_properties(record: &ServerRecord, overrides: &[ServerProperty]) -> String {
        let opts: &GameOptions = &record.game_options;
        let rcon_port = record.port.saturating_add(REMOTE_CONSOLE_PORT_OFFSET);
        let mut lines: Vec<(String, String)> = vec![
            ("server-port".to_string(), record.port.to_string()),
            ("motd".to_string(), opts.motd.clone()),
            ("difficulty".to_string(), opts.difficulty.clone()),
            ("gamemode".to_string(), opts.gamemode.clone()),
            ("pvp".to_string(), opts.pvp.to_string()),
            ("white-list".to_string(), opts.whitelist.to_string()),
            ("online-mode".to_string(), opts.online_mode.to_string()),
            ("max-players".to_string(), opts.max_players.to_string()),
            ("enable-rcon".to_string(), "true".to_string()),
            ("rcon.port".to_string(), rcon_port.to_string()),
            ("rcon.password".to_string(), REMOTE_CONSOLE_PASSWORD.to_string()),
        ];
        if let Some(seed) = &opts.seed {
            lines.push(("level-seed".to_string(), seed.clone()));
        }

        for prop in overrides {
            match lines.iter_mut().find(|(key, _)| key == &prop.key) {
                Some(existing) => existing.1 = prop.value.clone(),
                None => lines.push((prop.key.clone(), prop.value.clone())),
            }
        }

        lines.into_iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>().join("\n") + "\n"
    }

    pub fn render_eula() -> String {
        "eula=true\n".to_string()
    }

    /// Forge and NeoForge read JVM memory flags from this file instead of
    /// accepting them on the launch command line.
    pub fn render_user_jvm_args(record: &ServerRecord) -> Option<String> {
        match record.engine {
            EngineFamily::Forge | EngineFamily::NeoForge => {
                let mut args = vec![format!("-Xmx{}M", record.memory_mb), format!("-Xms{}M", record.memory_mb.min(1024))];
                if !record.jvm_opts.is_empty() {
                    args.extend(record.jvm_opts.split_whitespace().map(str::to_string));
                }
                Some(args.join("\n") + "\n")
            }
            _ => None,
        }
    }

    pub async fn write_all(record: &ServerRecord, overrides: &[ServerProperty], server_dir: &std::path::Path) -> Result<()> {
        tokio::fs::write(server_dir.join("server.properties"), Self::render_server_properties(record, overrides)).await?;
        tokio::fs::write(server_dir.join("eula.txt"), Self::render_eula()).await?;
        if let Some(contents) = Self::render_user_jvm_args(record) {
            tokio::fs::write(server_dir.join("user_jvm_args.txt"), contents).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample(engine: EngineFamily) -> ServerRecord {
        ServerRecord {
            id: Uuid::new_v4(),
            name: "alpha".to_string(),
            description: None,
            engine,
            version: "1.20.4".to_string(),
            port: 25565,
            memory_mb: 2048,
            jvm_opts: String::new(),
            auto_start: false,
            backup_schedule_enabled: false,
            state: crate::models::ServerState::Stopped,
            storage_kind: crate::models::StorageKind::BindPath,
            storage_path: "/tmp/alpha".to_string(),
            process_handle: None,
            game_options: GameOptions::default(),
            modpack_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rcon_port_is_offset_by_ten_thousand() {
        let record = sample(EngineFamily::Vanilla);
        let properties = ConfigWriter::render_server_properties(&record, &[]);
        assert!(properties.contains("rcon.port=35565"));
    }

    #[test]
    fn only_forge_family_gets_user_jvm_args() {
        assert!(ConfigWriter::render_user_jvm_args(&sample(EngineFamily::Forge)).is_some());
        assert!(ConfigWriter::render_user_jvm_args(&sample(EngineFamily::Vanilla)).is_none());
    }

    #[test]
    fn user_jvm_args_clamps_xms_to_one_gigabyte() {
        let mut record = sample(EngineFamily::Forge);
        record.memory_mb = 2048;
        let args = ConfigWriter::render_user_jvm_args(&record).unwrap();
        assert!(args.contains("-Xmx2048M"));
        assert!(args.contains("-Xms1024M"));
    }

    #[test]
    fn custom_property_overrides_the_typed_default() {
        let record = sample(EngineFamily::Vanilla);
        let overrides = [ServerProperty {
            server_id: record.id,
            key: "difficulty".to_string(),
            value: "hard".to_string(),
        }];
        let properties = ConfigWriter::render_server_properties(&record, &overrides);
        assert!(properties.contains("difficulty=hard"));
        assert!(!properties.contains("difficulty=normal"));
    }

    #[test]
    fn unrecognized_custom_property_is_appended() {
        let record = sample(EngineFamily::Vanilla);
        let overrides = [ServerProperty {
            server_id: record.id,
            key: "view-distance".to_string(),
            value: "12".to_string(),
        }];
        let properties = ConfigWriter::render_server_properties(&record, &overrides);
        assert!(properties.contains("view-distance=12"));
    }
}
