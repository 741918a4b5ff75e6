use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{BridgeError, Result};

const DEFAULT_BASE_URL: &str = "https://app.asana.com/api/1.0";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
/// The provider's operating timezone. Stored notes embed timestamps in this
/// offset, so changing it only affects blocks written afterwards.
const DEFAULT_UTC_OFFSET: &str = "-03:00";
const DEFAULT_DATABASE_PATH: &str = "alertbridge.db";

/// Environment variable holding the provider access token. The token is
/// never read from the config file.
pub const TOKEN_ENV: &str = "PROVIDER_TOKEN";

// ─── ProviderConfig ───────────────────────────────────────────────────────────

/// Task Provider connection settings (`[provider]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider API base URL.
    pub base_url: String,
    /// Workspace every task is created in.
    pub workspace: String,
    /// Fixed UTC offset of the provider's operating timezone, e.g. `"-03:00"`.
    /// Occurrence timestamps in task notes are formatted in this offset.
    pub utc_offset: String,
    /// Per-request timeout in seconds. There is no automatic retry; retries
    /// would break the engine's at-most-once-per-transition semantics.
    pub request_timeout_secs: u64,
    /// Access token. Populated from the `PROVIDER_TOKEN` env var on load,
    /// never from the TOML file.
    #[serde(skip)]
    pub token: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            workspace: String::new(),
            utc_offset: DEFAULT_UTC_OFFSET.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token: String::new(),
        }
    }
}

impl ProviderConfig {
    /// Parse the configured operating-timezone offset.
    pub fn operating_offset(&self) -> Result<FixedOffset> {
        self.utc_offset
            .parse::<FixedOffset>()
            .map_err(|e| BridgeError::Validation(format!("utc_offset {:?}: {e}", self.utc_offset)))
    }
}

// ─── DatabaseConfig ───────────────────────────────────────────────────────────

/// Local mirror database settings (`[database]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path. Created if missing.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

// ─── BridgeConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub provider: ProviderConfig,
    pub database: DatabaseConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file is absent. The provider token always comes from `PROVIDER_TOKEN`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| BridgeError::Validation(format!("read {}: {e}", path.display())))?;
            toml::from_str::<Self>(&raw)
                .map_err(|e| BridgeError::Validation(format!("parse {}: {e}", path.display())))?
        } else {
            info!(path = %path.display(), "no config file — using defaults");
            Self::default()
        };

        match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.is_empty() => config.provider.token = token,
            _ => warn!("{TOKEN_ENV} not set — provider calls will be rejected upstream"),
        }

        // Fail fast on an unparseable offset instead of at the first merge.
        config.provider.operating_offset()?;
        Ok(config)
    }
}
