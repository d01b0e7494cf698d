use std::time::Duration;

use crate::error::{ChainFsError, Result};

/// Minimum spacing between remote calls, in (possibly fractional) seconds.
pub const RATE_LIMIT_ENV: &str = "CHAINFS_RATE_LIMIT";
/// Retry budget for throttling responses.
pub const MAX_RETRIES_ENV: &str = "CHAINFS_MAX_RETRIES";

#[derive(Clone, Debug)]
pub struct Config {
    /// Minimum spacing between remote calls.
    pub min_interval: Duration,
    /// Throttling retries before the signal becomes fatal.
    pub max_attempts: u32,
    /// First backoff step; doubles on every further attempt.
    pub retry_base: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_interval: Duration::ZERO,
            max_attempts: 5,
            retry_base: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Read settings from the environment; unset variables keep defaults,
    /// malformed values are fatal.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();
        if let Ok(v) = std::env::var(RATE_LIMIT_ENV) {
            cfg.min_interval = parse_interval(&v)?;
        }
        if let Ok(v) = std::env::var(MAX_RETRIES_ENV) {
            cfg.max_attempts = v.parse().map_err(|_| {
                ChainFsError::Config(format!("{MAX_RETRIES_ENV} must be an integer, got {v:?}"))
            })?;
        }
        Ok(cfg)
    }
}

fn parse_interval(value: &str) -> Result<Duration> {
    let secs: f64 = value.parse().map_err(|_| {
        ChainFsError::Config(format!(
            "{RATE_LIMIT_ENV} must be a number of seconds, got {value:?}"
        ))
    })?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ChainFsError::Config(format!(
            "{RATE_LIMIT_ENV} must be non-negative, got {value:?}"
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_parses_fractional_seconds() {
        assert_eq!(parse_interval("0.25").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_interval("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn interval_rejects_garbage() {
        assert!(parse_interval("fast").is_err());
        assert!(parse_interval("-1").is_err());
        assert!(parse_interval("NaN").is_err());
    }
}
