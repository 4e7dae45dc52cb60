use anyhow::Result;
use chrono::Weekday;
use log::warn;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub official: OfficialSourceConfig,
    pub p2p: P2pConfig,
    pub cache: CacheConfig,
    pub schedule: ScheduleConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// The central-bank page the official USD/EUR rates are scraped from.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OfficialSourceConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub retries: u32,
    /// The site rejects default client identifiers, so a browser-like
    /// user-agent is sent with every request.
    pub user_agent: String,
    /// Scoped TLS relaxation for this one endpoint's broken certificate
    /// chain. Off by default; enabling it is logged at startup.
    pub accept_invalid_certs: bool,
}

impl Default for OfficialSourceConfig {
    fn default() -> Self {
        Self {
            url: "https://www.bcv.org.ve/".to_string(),
            timeout_secs: 15,
            retries: 3,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/100.0.4896.127 Safari/537.36"
                .to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// Binance P2P advert-search endpoint for USDT/VES quotes.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct P2pConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub asset: String,
    pub fiat: String,
    /// Adverts requested per page from the marketplace.
    pub rows: u32,
    /// Adverts averaged after the sponsored head entry is dropped.
    pub sample_size: usize,
    pub user_agent: String,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            url: "https://p2p.binance.com/bapi/c2c/v2/friendly/c2c/adv/search".to_string(),
            timeout_secs: 10,
            asset: "USDT".to_string(),
            fiat: "VES".to_string(),
            rows: 10,
            sample_size: 5,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age at which cached rates are served without a refresh.
    pub freshness_hours: i64,
    /// Days on which the upstream publishes nothing; cached values are
    /// served unconditionally. Weekday names, e.g. "sat", "sunday".
    pub quiet_days: Vec<String>,
    /// Local hours at which a refresh is attempted even inside the
    /// freshness window.
    pub forced_hours: Vec<u32>,
    /// Fixed offset of the upstream's local time. Venezuela has no DST.
    pub utc_offset_hours: i32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_hours: 4,
            quiet_days: vec!["sat".to_string(), "sun".to_string()],
            forced_hours: vec![6, 19, 20, 21],
            utc_offset_hours: -4,
        }
    }
}

impl CacheConfig {
    pub fn quiet_weekdays(&self) -> Vec<Weekday> {
        self.quiet_days
            .iter()
            .filter_map(|name| match Weekday::from_str(name) {
                Ok(day) => Some(day),
                Err(_) => {
                    warn!("ignoring unrecognized quiet day {:?}", name);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local hour of the daily refresh.
    pub daily_hour: u32,
    /// Period of the recurring backup refresh.
    pub interval_minutes: u64,
    /// Delay of the single catch-up refresh after startup.
    pub startup_delay_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_hour: 6,
            interval_minutes: 30,
            startup_delay_minutes: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection string. When absent the service falls back to a
    /// local SQLite file.
    pub url: Option<String>,
    pub sqlite_path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            sqlite_path: "rates.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    /// Environment wins over the file for deployment-shaped settings.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = Some(url);
            }
        }
        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        self
    }
}
