//! Service configuration read from the environment at start-up.
//!
//! | Variable                 | Default                        |
//! |--------------------------|--------------------------------|
//! | `RISKPULSE_PORT`         | `3000`                         |
//! | `RISKPULSE_DATABASE_URL` | `sqlite:riskpulse.db?mode=rwc` |
//! | `RISKPULSE_REFRESH_SECS` | `300` (`0` disables refresh)   |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:riskpulse.db?mode=rwc";

/// Default roster refresh period in seconds.
pub const DEFAULT_REFRESH_SECS: u64 = 300;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,

    pub database_url: String,

    /// Period of the background roster refresh; `None` when disabled.
    pub refresh_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            refresh_interval: Some(Duration::from_secs(DEFAULT_REFRESH_SECS)),
        }
    }
}

impl Config {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Unparseable values fall back
    /// to their defaults with a warning.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = parse_or("RISKPULSE_PORT", lookup("RISKPULSE_PORT"), DEFAULT_PORT);

        let database_url = lookup("RISKPULSE_DATABASE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let refresh_secs = parse_or(
            "RISKPULSE_REFRESH_SECS",
            lookup("RISKPULSE_REFRESH_SECS"),
            DEFAULT_REFRESH_SECS,
        );

        Self {
            port,
            database_url,
            refresh_interval: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
        }
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = %raw, default = %default, "Invalid setting, using default");
            default
        }
    }
}
