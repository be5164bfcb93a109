use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_DATA_DIR: &str = "./data/diagrams";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Process-wide configuration, read from the environment once at startup.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    /// Single allowed origin for CORS and WebSocket upgrades.
    pub cors_origin: String,
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `PORT`, `CORS_ORIGIN`, `HEPH_DATA_DIR` and
    /// `HEPH_POLL_INTERVAL_SECS`, falling back to defaults for anything
    /// unset or unparseable.
    pub fn load() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let cors_origin = std::env::var("CORS_ORIGIN")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.cors_origin);

        let data_dir = std::env::var("HEPH_DATA_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let poll_interval = std::env::var("HEPH_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        Self {
            port,
            cors_origin,
            data_dir,
            poll_interval,
        }
    }
}
