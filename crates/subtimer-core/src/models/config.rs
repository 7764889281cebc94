//! Application configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    pub coordinator: CoordinatorConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorConfig {
    /// Floor on remaining time after any extension or reduction
    pub min_remaining_ms: i64,
    /// How callers derive a warning offset when none is given explicitly
    pub warning: WarningPolicy,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

/// Warning lead applied by callers that don't pass an explicit offset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningPolicy {
    None,
    /// Warn when this fraction of the duration is left
    Fraction { fraction: f64 },
    /// Warn this many milliseconds before the deadline
    Lead { lead_ms: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    pub log_level: String,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()?;
        self.daemon.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            coordinator: CoordinatorConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Validate coordinator configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_remaining_ms < 0 {
            return Err(Error::Validation(
                "Minimum remaining time cannot be negative".to_string(),
            ));
        }

        if self.event_capacity == 0 {
            return Err(Error::Validation(
                "Event capacity must be greater than 0".to_string(),
            ));
        }

        self.warning.validate()
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_remaining_ms: 60_000, // 1 minute
            warning: WarningPolicy::default(),
            event_capacity: 1000,
        }
    }
}

impl WarningPolicy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            WarningPolicy::None => Ok(()),
            WarningPolicy::Fraction { fraction } => {
                if !(0.0..=1.0).contains(&fraction) {
                    return Err(Error::Validation(format!(
                        "Warning fraction {} must be between 0 and 1",
                        fraction
                    )));
                }
                Ok(())
            }
            WarningPolicy::Lead { lead_ms } => {
                if lead_ms < 0 {
                    return Err(Error::Validation(
                        "Warning lead cannot be negative".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Warning offset from activation for a timeout of `total_ms`
    pub fn offset_for(&self, total_ms: i64) -> Option<i64> {
        if total_ms <= 0 {
            return None;
        }

        match *self {
            WarningPolicy::None => None,
            WarningPolicy::Fraction { fraction } => {
                let lead = (total_ms as f64 * fraction).round() as i64;
                Some((total_ms - lead).max(0))
            }
            WarningPolicy::Lead { lead_ms } => Some((total_ms - lead_ms).max(0)),
        }
    }
}

impl Default for WarningPolicy {
    fn default() -> Self {
        WarningPolicy::Fraction { fraction: 0.2 }
    }
}

impl DaemonConfig {
    /// Validate daemon configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(Error::Validation(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log_level,
                valid_log_levels.join(", ")
            )));
        }

        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.coordinator.min_remaining_ms, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_coordinator_config_invalid() {
        let mut config = CoordinatorConfig {
            min_remaining_ms: -1,
            ..CoordinatorConfig::default()
        };
        assert!(config.validate().is_err());

        config.min_remaining_ms = 0;
        config.event_capacity = 0;
        assert!(config.validate().is_err());

        config.event_capacity = 16;
        config.warning = WarningPolicy::Fraction { fraction: 1.5 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_daemon_config_validation() {
        let mut config = DaemonConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warning_offsets() {
        let fraction = WarningPolicy::Fraction { fraction: 0.2 };
        assert_eq!(fraction.offset_for(100_000), Some(80_000));

        let lead = WarningPolicy::Lead { lead_ms: 30_000 };
        assert_eq!(lead.offset_for(100_000), Some(70_000));
        assert_eq!(lead.offset_for(10_000), Some(0));

        assert_eq!(WarningPolicy::None.offset_for(100_000), None);
        assert_eq!(fraction.offset_for(0), None);
    }

    #[test]
    fn test_warning_policy_serialization() {
        let json = serde_json::to_string(&WarningPolicy::Lead { lead_ms: 5000 }).unwrap();
        assert_eq!(json, r#"{"kind":"lead","lead_ms":5000}"#);

        let policy: WarningPolicy = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(policy, WarningPolicy::None);
    }
}
