//! Core configuration
//!
//! Plain struct with sensible defaults and named presets. Can be loaded
//! from JSON; durations are written the human way (`"10ms"`, `"1s"`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use bluccino_core::{BlError, BlResult, DEFAULT_LOG_CAPACITY};
use bluccino_gear::{RegistryLimits, DEFAULT_MAX_DECORATORS, DEFAULT_MAX_GEARS};

/// Logging setup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// One JSON object per line instead of human readable output
    pub json: bool,
    /// Include the module path of each event
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// Core configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Gear table size
    pub max_gears: usize,
    /// Decorator chain length per gear
    pub max_decorators_per_gear: usize,
    /// Messages dispatched per tick at most
    pub dispatch_batch: usize,
    /// Diagnostics records kept; 0 keeps counters only
    pub log_capacity: usize,
    /// Period of the SYS:TICK heartbeat, none to disable
    #[serde(with = "opt_duration")]
    pub tick_period: Option<Duration>,
    /// Period of the SYS:TOCK heartbeat, none to disable
    #[serde(with = "opt_duration")]
    pub tock_period: Option<Duration>,
    /// How long the host loop sleeps when the queue is empty
    #[serde(with = "duration")]
    pub idle_poll: Duration,
    pub logging: LoggingConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            max_gears: DEFAULT_MAX_GEARS,
            max_decorators_per_gear: DEFAULT_MAX_DECORATORS,
            dispatch_batch: 16,
            log_capacity: DEFAULT_LOG_CAPACITY,
            tick_period: None,
            tock_period: None,
            idle_poll: Duration::from_millis(1),
            logging: LoggingConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Small tables and no record buffer, for the tightest targets
    pub fn minimal() -> Self {
        CoreConfig {
            max_gears: 8,
            max_decorators_per_gear: 2,
            dispatch_batch: 4,
            log_capacity: 0,
            ..Self::default()
        }
    }

    /// Default tables plus a 10ms TICK and 1s TOCK heartbeat
    pub fn with_heartbeat() -> Self {
        CoreConfig {
            tick_period: Some(Duration::from_millis(10)),
            tock_period: Some(Duration::from_secs(1)),
            ..Self::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> BlResult<Self> {
        let config: CoreConfig =
            serde_json::from_str(json).map_err(|e| BlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> BlResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BlError::Config(e.to_string()))
    }

    /// Reject values the core cannot run with
    pub fn validate(&self) -> BlResult<()> {
        if self.max_gears == 0 {
            return Err(BlError::Config("max_gears must be at least 1".into()));
        }
        if self.max_decorators_per_gear == 0 {
            return Err(BlError::Config("max_decorators_per_gear must be at least 1".into()));
        }
        if self.dispatch_batch == 0 {
            return Err(BlError::Config("dispatch_batch must be at least 1".into()));
        }
        for (name, period) in [("tick_period", self.tick_period), ("tock_period", self.tock_period)] {
            if period.is_some_and(|p| p.is_zero()) {
                return Err(BlError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }

    pub fn registry_limits(&self) -> RegistryLimits {
        RegistryLimits {
            max_gears: self.max_gears,
            max_decorators_per_gear: self.max_decorators_per_gear,
        }
    }
}

mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

mod opt_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(text) => humantime::parse_duration(&text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
