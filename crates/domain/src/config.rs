use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ServerSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identity and tuning for one serverset.
///
/// ```toml
/// environment = "prod"
/// role = "www-data"
/// service = "frontend"
/// servers = ["zk1:2181", "zk2:2181"]
///
/// [refresh]
/// max_attempts = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSetConfig {
    #[serde(default = "d_environment")]
    pub environment: String,
    pub role: String,
    pub service: String,
    /// Coordination ensemble addresses.  Handed to whichever client opens
    /// the session; the serverset itself never dials them.
    #[serde(default = "d_servers")]
    pub servers: Vec<String>,
    #[serde(default = "d_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default)]
    pub refresh: RetryConfig,
}

impl ServerSetConfig {
    pub fn new(
        environment: impl Into<String>,
        role: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            role: role.into(),
            service: service.into(),
            servers: d_servers(),
            session_timeout_ms: d_session_timeout_ms(),
            refresh: RetryConfig::default(),
        }
    }

    /// Parse a TOML document and check that the identity segments are usable
    /// as path components.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("environment", &self.environment),
            ("role", &self.role),
            ("service", &self.service),
        ] {
            if value.is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
            if value.contains('/') {
                return Err(Error::Config(format!("{field} must not contain '/': {value}")));
            }
        }
        if self.refresh.backoff_factor < 1.0 {
            return Err(Error::Config(format!(
                "refresh.backoff_factor must be >= 1.0, got {}",
                self.refresh.backoff_factor
            )));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Refresh retry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Back-off applied when a watch refresh fails on a transient error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "d_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "d_backoff_factor")]
    pub backoff_factor: f64,
    /// `0` means retry until the watch is closed.
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: d_initial_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
            backoff_factor: d_backoff_factor(),
            max_attempts: d_max_attempts(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_environment() -> String {
    "prod".into()
}
fn d_servers() -> Vec<String> {
    vec!["localhost:2181".into()]
}
fn d_session_timeout_ms() -> u64 {
    10_000
}
fn d_initial_delay_ms() -> u64 {
    100
}
fn d_max_delay_ms() -> u64 {
    10_000
}
fn d_backoff_factor() -> f64 {
    2.0
}
fn d_max_attempts() -> u32 {
    10
}
