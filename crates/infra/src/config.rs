//! Service configuration read from `STOCKROUTE_*` environment variables.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroute_observability::LogFormat;

pub const ENV_LOG: &str = "STOCKROUTE_LOG";
pub const ENV_LOG_FORMAT: &str = "STOCKROUTE_LOG_FORMAT";
pub const ENV_FUEL_L_PER_100KM: &str = "STOCKROUTE_FUEL_L_PER_100KM";
pub const ENV_DEVICE_ONLINE_MINUTES: &str = "STOCKROUTE_DEVICE_ONLINE_MINUTES";
pub const ENV_DISPATCH_ATTEMPTS: &str = "STOCKROUTE_DISPATCH_ATTEMPTS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Average consumption used for route fuel estimates; `None` disables them.
    pub fuel_l_per_100km: Option<f64>,
    /// A device counts as online if heard from within this many minutes.
    pub device_online_minutes: u32,
    /// Load-decide-append rounds before a version conflict is surfaced.
    pub dispatch_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::Json,
            fuel_l_per_100km: None,
            device_online_minutes: 15,
            dispatch_attempts: 3,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(filter) = get(ENV_LOG) {
            cfg.log_filter = filter;
        }

        if let Some(format) = get(ENV_LOG_FORMAT) {
            cfg.log_format = format
                .parse()
                .map_err(|e: stockroute_observability::ParseLogFormatError| {
                    ConfigError::invalid(ENV_LOG_FORMAT, e.to_string())
                })?;
        }

        if let Some(raw) = get(ENV_FUEL_L_PER_100KM) {
            let rate: f64 = raw
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_FUEL_L_PER_100KM, format!("'{raw}' is not a number")))?;
            if !rate.is_finite() || rate < 0.0 {
                return Err(ConfigError::invalid(ENV_FUEL_L_PER_100KM, "must be a non-negative number"));
            }
            cfg.fuel_l_per_100km = Some(rate);
        }

        if let Some(raw) = get(ENV_DEVICE_ONLINE_MINUTES) {
            cfg.device_online_minutes = parse_positive(ENV_DEVICE_ONLINE_MINUTES, &raw)?;
        }

        if let Some(raw) = get(ENV_DISPATCH_ATTEMPTS) {
            cfg.dispatch_attempts = parse_positive(ENV_DISPATCH_ATTEMPTS, &raw)?;
        }

        Ok(cfg)
    }

    pub fn device_online_window(&self) -> Duration {
        Duration::minutes(i64::from(self.device_online_minutes))
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.parse::<u32>() {
        Ok(0) => Err(ConfigError::invalid(var, "must be at least 1")),
        Ok(n) => Ok(n),
        Err(_) => Err(ConfigError::invalid(var, format!("'{raw}' is not a positive integer"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.device_online_window(), Duration::minutes(15));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = ServiceConfig::from_lookup(lookup(&[
            (ENV_LOG, "stockroute_infra=debug"),
            (ENV_LOG_FORMAT, "pretty"),
            (ENV_FUEL_L_PER_100KM, "11.5"),
            (ENV_DEVICE_ONLINE_MINUTES, "5"),
            (ENV_DISPATCH_ATTEMPTS, " 7 "),
        ]))
        .unwrap();
        assert_eq!(cfg.log_filter, "stockroute_infra=debug");
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.fuel_l_per_100km, Some(11.5));
        assert_eq!(cfg.device_online_minutes, 5);
        assert_eq!(cfg.dispatch_attempts, 7);
    }

    #[test]
    fn invalid_values_fail_closed() {
        for (var, value) in [
            (ENV_LOG_FORMAT, "xml"),
            (ENV_FUEL_L_PER_100KM, "-3"),
            (ENV_FUEL_L_PER_100KM, "lots"),
            (ENV_DEVICE_ONLINE_MINUTES, "0"),
            (ENV_DISPATCH_ATTEMPTS, "three"),
        ] {
            let err = ServiceConfig::from_lookup(lookup(&[(var, value)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { var: v, .. } if v == var));
        }
    }
}
