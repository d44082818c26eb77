use std::path::{Path, PathBuf};

use allay_kit_store::KindConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub world: WorldSection,
    #[serde(default = "default_homes")]
    pub homes: KindConfig,
    #[serde(default)]
    pub warps: KindConfig,
    #[serde(default = "default_mail")]
    pub mail: KindConfig,
    #[serde(default = "default_bounties")]
    pub bounties: KindConfig,
    #[serde(default)]
    pub trade: RequestSection,
    #[serde(default = "default_teleport")]
    pub teleport: RequestSection,
}

#[derive(Debug, Deserialize)]
pub struct StorageSection {
    /// Root directory for every plugin's JSON documents.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    "plugin_data".into()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SchedulerSection {
    /// Length of one host tick in milliseconds. Default: 50 (20 TPS).
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// Ticks between expiry sweeps. Default: 72000 (one hour).
    #[serde(default = "default_sweep_interval_ticks")]
    pub sweep_interval_ticks: u64,
}

fn default_tick_millis() -> u64 {
    50
}

fn default_sweep_interval_ticks() -> u64 {
    72_000
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            sweep_interval_ticks: default_sweep_interval_ticks(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WorldSection {
    /// Dimensions players can be teleported into.
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<String>,
    #[serde(default = "default_spawn")]
    pub spawn: [f64; 3],
}

fn default_dimensions() -> Vec<String> {
    vec!["overworld".into(), "nether".into(), "the_end".into()]
}

fn default_spawn() -> [f64; 3] {
    [0.5, 64.0, 0.5]
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            spawn: default_spawn(),
        }
    }
}

/// Settings for two-party requests (trades, teleport requests).
#[derive(Debug, Deserialize)]
pub struct RequestSection {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub cooldown_seconds: Option<u64>,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for RequestSection {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            cooldown_seconds: None,
        }
    }
}

fn default_homes() -> KindConfig {
    KindConfig::unbounded()
        .with_max_per_owner(5)
        .with_cooldown_seconds(3)
}

fn default_mail() -> KindConfig {
    KindConfig::unbounded()
        .with_max_per_owner(54)
        .with_expiry_seconds(30 * 24 * 3600)
}

fn default_bounties() -> KindConfig {
    KindConfig::unbounded()
        .with_max_per_owner(10)
        .with_expiry_seconds(7 * 24 * 3600)
}

fn default_teleport() -> RequestSection {
    RequestSection {
        request_timeout_seconds: default_request_timeout(),
        cooldown_seconds: Some(5),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage: StorageSection::default(),
            logging: LoggingSection::default(),
            scheduler: SchedulerSection::default(),
            world: WorldSection::default(),
            homes: default_homes(),
            warps: KindConfig::unbounded(),
            mail: default_mail(),
            bounties: default_bounties(),
            trade: RequestSection::default(),
            teleport: default_teleport(),
        }
    }
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load `path`, or fall back to defaults when it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("plugin_data"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.scheduler.tick_millis, 50);
        assert_eq!(config.homes.max_per_owner, Some(5));
        assert_eq!(config.homes.cooldown_seconds, Some(3));
        assert_eq!(config.warps.max_per_owner, None);
        assert_eq!(config.mail.max_per_owner, Some(54));
        assert_eq!(config.mail.expiry_seconds, Some(2_592_000));
        assert_eq!(config.bounties.expiry_seconds, Some(604_800));
        assert_eq!(config.trade.request_timeout_seconds, 60);
        assert_eq!(config.teleport.cooldown_seconds, Some(5));
        assert_eq!(config.world.dimensions.len(), 3);
    }

    #[test]
    fn sections_override_defaults() {
        let toml_str = r#"
            [storage]
            data_dir = "/srv/bedrock/data"

            [logging]
            level = "debug"

            [scheduler]
            sweep_interval_ticks = 1200

            [homes]
            max_per_owner = 3

            [mail]
            max_per_owner = 27
            expiry_seconds = 86400

            [teleport]
            request_timeout_seconds = 30
        "#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/bedrock/data"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.scheduler.sweep_interval_ticks, 1200);
        assert_eq!(config.scheduler.tick_millis, 50);
        // A present section replaces the whole default for that kind.
        assert_eq!(config.homes.max_per_owner, Some(3));
        assert_eq!(config.homes.cooldown_seconds, None);
        assert_eq!(config.mail.expiry_seconds, Some(86_400));
        assert_eq!(config.teleport.request_timeout_seconds, 30);
        assert_eq!(config.teleport.cooldown_seconds, None);
    }

    #[test]
    fn missing_file_falls_back() {
        let path = std::env::temp_dir().join(format!("allay_cfg_{}.toml", rand::random::<u64>()));
        let config = ServerConfig::load_or_default(&path).unwrap();
        assert_eq!(config.homes.max_per_owner, Some(5));
    }
}
