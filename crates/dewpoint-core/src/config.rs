//! Engine configuration.
//!
//! Loading, validating, and defaulting the polling parameters: cycle
//! interval, scan timing, settle delay, recovery thresholds, and the
//! advertisement signature that identifies our sensors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::radio::{Advertisement, SensorChannel};

/// `aa:bb` or `aa:bb:cc:dd:ee:ff` style address prefixes.
static ADDRESS_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){0,5}$").expect("valid regex"));

/// Configuration could not be loaded or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found at {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Offending path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A parsed value is out of range.
    #[error("invalid configuration: {field}: {message}")]
    Validation {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Which advertisements belong to our sensors.
///
/// A device matches when its advertised local name equals `local_name` or
/// its address starts with `address_prefix`. At least one marker must be
/// configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceSignature {
    /// Exact advertised name to match.
    pub local_name: Option<String>,
    /// Address prefix to match, case-insensitive, e.g. `4c:65:a8:dc`.
    pub address_prefix: Option<String>,
}

impl Default for DeviceSignature {
    fn default() -> Self {
        Self {
            local_name: Some("CC2650 SensorTag".to_owned()),
            address_prefix: None,
        }
    }
}

impl DeviceSignature {
    /// Returns `true` if the advertisement matches either marker.
    #[must_use]
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        if let (Some(expected), Some(name)) = (&self.local_name, &advertisement.local_name) {
            if expected == name {
                return true;
            }
        }
        if let Some(prefix) = &self.address_prefix {
            if advertisement
                .address
                .to_ascii_lowercase()
                .starts_with(&prefix.to_ascii_lowercase())
            {
                return true;
            }
        }
        false
    }
}

/// Polling engine parameters. All intervals are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between measurement cycles per device.
    pub measure_interval_secs: u64,

    /// Upper bound on a single scan pass, in seconds.
    pub scan_timeout_secs: u64,

    /// Seconds between scan passes while no device is tracked.
    pub scan_interval_secs: u64,

    /// Seconds between scan passes once at least one device is tracked;
    /// longer, to back off radio contention in steady state.
    pub rescan_interval_secs: u64,

    /// Hardware settle delay between enabling a channel and reading it.
    pub settle_delay_secs: u64,

    /// Seconds between supervisor health checks.
    pub check_interval_secs: u64,

    /// Consecutive failed health checks before the adapter is recycled.
    pub fault_threshold: u32,

    /// Settle delay around an adapter power-cycle, in seconds.
    pub reset_settle_secs: u64,

    /// Channels polled on each device per cycle.
    pub channels: Vec<SensorChannel>,

    /// Advertisement markers identifying our sensors.
    pub signature: DeviceSignature,

    /// Credential store file. `None` selects the platform default.
    pub store_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            measure_interval_secs: 120,
            scan_timeout_secs: 10,
            scan_interval_secs: 300,
            rescan_interval_secs: 1200,
            settle_delay_secs: 1,
            check_interval_secs: 30,
            fault_threshold: 10,
            reset_settle_secs: 2,
            channels: vec![SensorChannel::Combined, SensorChannel::Battery],
            signature: DeviceSignature::default(),
            store_path: None,
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, unreadable,
    /// unparsable, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an existing file is unreadable, invalid,
    /// or fails validation.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// The platform's default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/dewpoint/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "dewpoint")
                .map(|dirs| dirs.config_dir().join("config.toml"))
                .unwrap_or_else(|| PathBuf::from("dewpoint.toml"))
        }
    }

    /// The platform's default credential store path.
    #[must_use]
    pub fn default_store_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/var/lib/dewpoint/credentials.json")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "dewpoint")
                .map(|dirs| dirs.data_dir().join("credentials.json"))
                .unwrap_or_else(|| PathBuf::from("credentials.json"))
        }
    }

    /// Check every field for plausibility.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero: [(&'static str, u64); 6] = [
            ("measure_interval_secs", self.measure_interval_secs),
            ("scan_timeout_secs", self.scan_timeout_secs),
            ("scan_interval_secs", self.scan_interval_secs),
            ("rescan_interval_secs", self.rescan_interval_secs),
            ("settle_delay_secs", self.settle_delay_secs),
            ("check_interval_secs", self.check_interval_secs),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Validation {
                    field,
                    message: "must be at least 1 second".to_owned(),
                });
            }
        }
        if self.fault_threshold == 0 {
            return Err(ConfigError::Validation {
                field: "fault_threshold",
                message: "must be at least 1".to_owned(),
            });
        }
        if self.channels.is_empty() {
            return Err(ConfigError::Validation {
                field: "channels",
                message: "at least one channel must be polled".to_owned(),
            });
        }
        if self.signature.local_name.is_none() && self.signature.address_prefix.is_none() {
            return Err(ConfigError::Validation {
                field: "signature",
                message: "a local_name or address_prefix marker is required".to_owned(),
            });
        }
        if let Some(prefix) = &self.signature.address_prefix {
            if !ADDRESS_PREFIX.is_match(prefix) {
                return Err(ConfigError::Validation {
                    field: "signature.address_prefix",
                    message: format!("'{prefix}' is not a colon-separated hex prefix"),
                });
            }
        }
        Ok(())
    }

    /// Pause between measurement cycles per device.
    #[must_use]
    pub const fn measure_interval(&self) -> Duration {
        Duration::from_secs(self.measure_interval_secs)
    }

    /// Upper bound on a single scan pass.
    #[must_use]
    pub const fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Pause between scan passes while nothing is tracked.
    #[must_use]
    pub const fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Pause between scan passes in steady state.
    #[must_use]
    pub const fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs)
    }

    /// Hardware settle delay after enabling a channel.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Pause between supervisor health checks.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Settle delay around an adapter power-cycle.
    #[must_use]
    pub const fn reset_settle(&self) -> Duration {
        Duration::from_secs(self.reset_settle_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn advert(address: &str, name: Option<&str>) -> Advertisement {
        Advertisement {
            address: address.to_owned(),
            local_name: name.map(str::to_owned),
            rssi: Some(-60),
            service_data: None,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = EngineConfig {
            measure_interval_secs: 0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation {
                field: "measure_interval_secs",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_signature_rejected() {
        let config = EngineConfig {
            signature: DeviceSignature {
                local_name: None,
                address_prefix: None,
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_address_prefix_rejected() {
        let config = EngineConfig {
            signature: DeviceSignature {
                local_name: None,
                address_prefix: Some("not-an-address".to_owned()),
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_channel_list_rejected() {
        let config = EngineConfig {
            channels: Vec::new(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_signature_matches_by_name() {
        let signature = DeviceSignature::default();
        assert!(signature.matches(&advert("AA:BB:CC:DD:EE:01", Some("CC2650 SensorTag"))));
        assert!(!signature.matches(&advert("AA:BB:CC:DD:EE:01", Some("Some Phone"))));
        assert!(!signature.matches(&advert("AA:BB:CC:DD:EE:01", None)));
    }

    #[test]
    fn test_signature_matches_by_address_prefix() {
        let signature = DeviceSignature {
            local_name: None,
            address_prefix: Some("4C:65:A8:DC".to_owned()),
        };
        assert!(signature.matches(&advert("4c:65:a8:dc:11:22", None)));
        assert!(!signature.matches(&advert("aa:65:a8:dc:11:22", None)));
    }

    #[test]
    fn test_load_parses_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "measure_interval_secs = 60\n\
             channels = [\"combined\"]\n\
             [signature]\n\
             address_prefix = \"4c:65:a8:dc\""
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.measure_interval_secs, 60);
        assert_eq!(config.scan_timeout_secs, 10);
        assert_eq!(config.channels, vec![SensorChannel::Combined]);
        assert_eq!(
            config.signature.address_prefix.as_deref(),
            Some("4c:65:a8:dc")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/dewpoint.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            EngineConfig::load_or_default(Path::new("/nonexistent/dewpoint.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_interval_accessors() {
        let config = EngineConfig::default();
        assert_eq!(config.measure_interval(), Duration::from_secs(120));
        assert_eq!(config.rescan_interval(), Duration::from_secs(1200));
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
    }
}
