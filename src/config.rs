use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::core::BackupMode;
use crate::core::engine::EngineType;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/bkjobs/config.toml";
const ENV_PREFIX: &str = "BKJOBS_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub http_bind: SocketAddr,
    pub engine: EngineType,
    pub duplicity_binary: PathBuf,
    pub scheduler_tick_secs: u64,
    /// Where headless restores are written, one directory per backup.
    pub restore_root: PathBuf,
    /// Mode used when a manual backup is started without a panel prompt.
    pub default_mode: BackupMode,
    pub auto_confirm_deletion: bool,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub channel: NotificationChannelType,
    #[serde(default)]
    pub slack_webhook: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelType {
    #[default]
    None,
    Slack,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("/var/lib/bkjobs/bkjobs.db"),
            http_bind: SocketAddr::from(([127, 0, 0, 1], 7878)),
            engine: EngineType::Duplicity,
            duplicity_binary: PathBuf::from("duplicity"),
            scheduler_tick_secs: 30,
            restore_root: PathBuf::from("/var/lib/bkjobs/restore"),
            default_mode: BackupMode::Incremental,
            auto_confirm_deletion: true,
            simulation: false,
            verbose: false,
            json_logs: false,
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load defaults, then the TOML file, then `BKJOBS_*` variables, then
    /// whatever CLI flags were given.
    pub fn new<T: Serialize>(config_path: Option<&Path>, cli_args: Option<&T>) -> Result<Self> {
        let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(args) = cli_args {
            figment = figment.merge(Serialized::defaults(args));
        }

        figment
            .extract()
            .with_context(|| format!("Failed to load configuration ({})", path.display()))
    }

    /// The engine actually used, accounting for `simulation`.
    pub fn effective_engine(&self) -> EngineType {
        if self.simulation {
            EngineType::Simulated
        } else {
            self.engine
        }
    }
}
