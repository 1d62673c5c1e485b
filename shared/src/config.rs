use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::capabilities::{validate_base_url, DriverIdentity};
use crate::RIDE_REQUESTS_TABLE;

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_SUPABASE_ACCESS_TOKEN: &str = "SUPABASE_ACCESS_TOKEN";
pub const ENV_CACHE_PATH: &str = "RIDE_DESK_CACHE_PATH";
pub const ENV_BACKFILL: &str = "RIDE_DESK_BACKFILL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "RIDE_DESK_REQUEST_TIMEOUT_SECS";
pub const ENV_DRIVER_ID: &str = "RIDE_DESK_DRIVER_ID";
pub const ENV_DRIVER_FIRST_NAME: &str = "RIDE_DESK_DRIVER_FIRST_NAME";
pub const ENV_DRIVER_LAST_NAME: &str = "RIDE_DESK_DRIVER_LAST_NAME";
pub const ENV_DRIVER_EMAIL: &str = "RIDE_DESK_DRIVER_EMAIL";

pub const DEFAULT_CACHE_PATH: &str = "ride-desk.sqlite3";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {var}")]
    Missing { var: &'static str },

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// How cached rides absent from the remote table get written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackfillMode {
    /// One existence check, then an insert if missing, per cached ride.
    #[default]
    CheckThenInsert,
    /// All cached rides in one insert that skips ids already present.
    BulkUpsert,
}

impl BackfillMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckThenInsert => "check-then-insert",
            Self::BulkUpsert => "bulk-upsert",
        }
    }
}

impl fmt::Display for BackfillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackfillMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "check-then-insert" => Ok(Self::CheckThenInsert),
            "bulk-upsert" => Ok(Self::BulkUpsert),
            other => Err(format!(
                "expected 'check-then-insert' or 'bulk-upsert', got '{other}'"
            )),
        }
    }
}

/// Connection settings for the hosted ride table.
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: SecretString,
    pub access_token: Option<SecretString>,
    pub table: String,
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("table", &self.table)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// The non-secret part of the configuration, handed to the core with
/// `Event::Configured`. Keys and tokens stay with the shell's executor.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DashboardSettings {
    pub base_url: String,
    pub table: String,
    pub backfill_mode: BackfillMode,
}

#[derive(Debug)]
pub struct Config {
    pub remote: RemoteConfig,
    pub cache_path: PathBuf,
    pub backfill_mode: BackfillMode,
    pub driver: Option<DriverIdentity>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the config from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |var: &'static str| get(var).ok_or(ConfigError::Missing { var });

        let url = require(ENV_SUPABASE_URL)?;
        validate_base_url(&url).map_err(|e| ConfigError::Invalid {
            var: ENV_SUPABASE_URL,
            reason: e.to_string(),
        })?;

        let request_timeout = get(ENV_REQUEST_TIMEOUT_SECS)
            .map(|raw| {
                raw.parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| ConfigError::Invalid {
                        var: ENV_REQUEST_TIMEOUT_SECS,
                        reason: format!("expected a positive number of seconds, got '{raw}'"),
                    })
            })
            .transpose()?;

        let backfill_mode = get(ENV_BACKFILL)
            .map(|raw| {
                raw.parse::<BackfillMode>().map_err(|reason| ConfigError::Invalid {
                    var: ENV_BACKFILL,
                    reason,
                })
            })
            .transpose()?
            .unwrap_or_default();

        let driver = get(ENV_DRIVER_ID).map(|id| {
            let mut driver = DriverIdentity::new(id);
            driver.first_name = get(ENV_DRIVER_FIRST_NAME);
            driver.last_name = get(ENV_DRIVER_LAST_NAME);
            driver.email = get(ENV_DRIVER_EMAIL);
            driver
        });

        Ok(Self {
            remote: RemoteConfig {
                url,
                anon_key: SecretString::new(require(ENV_SUPABASE_ANON_KEY)?),
                access_token: get(ENV_SUPABASE_ACCESS_TOKEN).map(SecretString::new),
                table: RIDE_REQUESTS_TABLE.to_string(),
                request_timeout,
            },
            cache_path: get(ENV_CACHE_PATH)
                .map_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH), PathBuf::from),
            backfill_mode,
            driver,
        })
    }

    #[must_use]
    pub fn dashboard_settings(&self) -> DashboardSettings {
        DashboardSettings {
            base_url: self.remote.url.clone(),
            table: self.remote.table.clone(),
            backfill_mode: self.backfill_mode,
        }
    }
}
