use serde::Deserialize;
use std::time::Duration;

/// Environment-driven configuration for the CLI runner.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base address of the stega server (e.g., "http://192.168.1.20:6100").
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Directory finished encode artifacts are saved into.
    #[serde(default = "default_gallery_dir")]
    pub gallery_dir: String,

    /// Timeout for the connectivity probe.
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:6100".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_gallery_dir() -> String {
    "./gallery".to_string()
}

fn default_ping_timeout_ms() -> u64 {
    5_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Network settings handed to the stego client.
    pub fn api(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Address and timeout of the remote stega API. The client holds this
/// behind a lock so it can be swapped at runtime between job executions.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
