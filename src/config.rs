//! TOML configuration loading (§6, SPEC_FULL.md §B.3).
//!
//! Grounded on `examples/original_source/discord-bot/gridbot/config.py`,
//! which reads the same `data/config.toml` shape via Python's `tomllib`.
//! This crate uses `serde`/`toml` instead, the teacher's pattern of parsing
//! config through `serde`-derived structs (see `src/bin/ebeans/args.rs`'s
//! use of `clap`'s derive macro for the analogous CLI-facing shape).

use std::path::Path;

use serde::Deserialize;

/// Top-level configuration, deserialized directly from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub token: String,
    pub guild: u64,
    pub channel: Option<u64>,
    #[serde(default)]
    pub admin_roles: Vec<u64>,
    #[serde(default)]
    pub banned_users: Vec<u64>,
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    #[serde(default)]
    pub mqtt_tls: bool,
    #[serde(default)]
    pub mqtt_username: String,
    #[serde(default)]
    pub mqtt_password: String,
    pub target_node: Option<String>,
    /// How long a job may sit unstarted before the controller gives up on
    /// it and edits in a failure notice (§C.6, seconds).
    #[serde(default = "default_unstarted_timeout_secs")]
    pub unstarted_timeout_secs: u64,
    /// Minimum silence, in seconds, a node must go before its reconnection
    /// after a drop triggers an explicit "back online" notice (§C.6).
    #[serde(default = "default_notify_threshold_secs")]
    pub notify_threshold_secs: u64,
    /// Minimum interval between unsolicited grid-status reports from the
    /// hourly auto-roll-call task (§C.5).
    #[serde(default = "default_min_report_secs")]
    pub min_report_secs: u64,
    /// Path to the object-storage relay config, if `!download` is enabled
    /// (§C.9). The relay itself is an out-of-scope external collaborator;
    /// this only gates whether the command is exposed at all.
    #[serde(default)]
    pub object_storage_relay: Option<String>,
}

impl Config {
    /// Whether `!download` should be exposed (§C.9).
    pub fn relay_configured(&self) -> bool {
        self.object_storage_relay.is_some()
    }
}

fn default_unstarted_timeout_secs() -> u64 {
    20
}

fn default_notify_threshold_secs() -> u64 {
    60
}

fn default_min_report_secs() -> u64 {
    3600
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }
}
