// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration.
//!
//! Every key has a default, so an empty file (or no file at all) is a valid
//! configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::frame::MAX_ENCODED_LEN;

/// Static slot -> driver assignment.
///
/// Replaces the driver the board's enumeration table names for that slot,
/// or loads a driver the board does not know about at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overload {
    /// Slot index in the driver-instance pool.
    pub slot: usize,
    /// Driver name as registered with the driver factory.
    pub driver: String,
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Serial device the board is attached to.
    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    /// Receive accumulation buffer size (bytes).
    #[serde(default = "default_rx_buffer_size")]
    pub rx_buffer_size: usize,

    /// Driver-instance pool size.
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,

    /// Resources per driver instance.
    #[serde(default = "default_max_resources")]
    pub max_resources: usize,

    /// Timer table capacity.
    #[serde(default = "default_max_timers")]
    pub max_timers: usize,

    /// Missing-acknowledgment timeout used by drivers (milliseconds).
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Log filter directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Hex-dump every packet at trace level.
    #[serde(default)]
    pub trace_packets: bool,

    /// Static driver assignments.
    #[serde(default, rename = "overload")]
    pub overloads: Vec<Overload>,
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_rx_buffer_size() -> usize {
    4000
}

fn default_max_slots() -> usize {
    32
}

fn default_max_resources() -> usize {
    10
}

fn default_max_timers() -> usize {
    50
}

fn default_ack_timeout_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
            rx_buffer_size: default_rx_buffer_size(),
            max_slots: default_max_slots(),
            max_resources: default_max_resources(),
            max_timers: default_max_timers(),
            ack_timeout_ms: default_ack_timeout_ms(),
            log_level: default_log_level(),
            trace_packets: false,
            overloads: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    #[must_use]
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Driver name statically assigned to `slot`, if any.
    #[must_use]
    pub fn overload_for(&self, slot: usize) -> Option<&str> {
        self.overloads
            .iter()
            .find(|o| o.slot == slot)
            .map(|o| o.driver.as_str())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial_port.is_empty() {
            return Err(ConfigError::Invalid("serial_port must not be empty".into()));
        }
        if self.rx_buffer_size < MAX_ENCODED_LEN {
            return Err(ConfigError::Invalid(format!(
                "rx_buffer_size {} is smaller than the largest encoded frame ({})",
                self.rx_buffer_size, MAX_ENCODED_LEN
            )));
        }
        if self.max_slots == 0 {
            return Err(ConfigError::Invalid("max_slots must be > 0".into()));
        }
        if self.max_resources == 0 {
            return Err(ConfigError::Invalid("max_resources must be > 0".into()));
        }
        if self.max_timers == 0 {
            return Err(ConfigError::Invalid("max_timers must be > 0".into()));
        }
        if self.ack_timeout_ms == 0 {
            return Err(ConfigError::Invalid("ack_timeout_ms must be > 0".into()));
        }

        let mut seen = HashSet::new();
        for overload in &self.overloads {
            if overload.slot == 0 {
                return Err(ConfigError::Invalid(
                    "slot 0 is reserved for the enumerator".into(),
                ));
            }
            if overload.slot >= self.max_slots {
                return Err(ConfigError::Invalid(format!(
                    "overload slot {} is outside the pool of {} slots",
                    overload.slot, self.max_slots
                )));
            }
            if overload.driver.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "overload for slot {} names no driver",
                    overload.slot
                )));
            }
            if !seen.insert(overload.slot) {
                return Err(ConfigError::Invalid(format!(
                    "slot {} is overloaded more than once",
                    overload.slot
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = DaemonConfig::from_toml("").expect("parse");
        assert_eq!(config.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.rx_buffer_size, 4000);
        assert_eq!(config.max_slots, 32);
        assert_eq!(config.max_resources, 10);
        assert_eq!(config.max_timers, 50);
        assert_eq!(config.ack_timeout(), Duration::from_millis(100));
        assert_eq!(config.log_level, "info");
        assert!(!config.trace_packets);
        assert!(config.overloads.is_empty());
    }

    #[test]
    fn test_parse_overloads() {
        let toml = r#"
serial_port = "/dev/ttyACM0"
trace_packets = true

[[overload]]
slot = 9
driver = "tts"

[[overload]]
slot = 3
driver = "out32"
"#;
        let config = DaemonConfig::from_toml(toml).expect("parse");
        assert_eq!(config.serial_port, "/dev/ttyACM0");
        assert!(config.trace_packets);
        assert_eq!(config.overload_for(9), Some("tts"));
        assert_eq!(config.overload_for(3), Some("out32"));
        assert_eq!(config.overload_for(4), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            "rx_buffer_size = 100",
            "max_slots = 0",
            "max_timers = 0",
            "ack_timeout_ms = 0",
            "serial_port = \"\"",
            "[[overload]]\nslot = 0\ndriver = \"x\"",
            "[[overload]]\nslot = 32\ndriver = \"x\"",
            "[[overload]]\nslot = 2\ndriver = \"\"",
            "[[overload]]\nslot = 2\ndriver = \"a\"\n[[overload]]\nslot = 2\ndriver = \"b\"",
        ];
        for case in cases {
            assert!(
                matches!(DaemonConfig::from_toml(case), Err(ConfigError::Invalid(_))),
                "accepted: {}",
                case
            );
        }
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            DaemonConfig::from_toml("max_slots = \"many\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_from_file_and_back() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "max_slots = 20\nlog_level = \"debug\"").expect("write");

        let config = DaemonConfig::from_file(file.path()).expect("load");
        assert_eq!(config.max_slots, 20);
        assert_eq!(config.log_level, "debug");

        let rendered = config.to_toml().expect("render");
        let again = DaemonConfig::from_toml(&rendered).expect("reparse");
        assert_eq!(again.max_slots, 20);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            DaemonConfig::from_file("/nonexistent/pclinkd.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
