//! Configuration types for gopro-usb
//!
//! Loaded from `~/.config/gopro-usb/config.json` when present; command line flags
//! are applied on top through the builder methods.

use crate::error::{Error, Result};
use crate::serial::FALLBACK_ADDRESS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// mDNS service type advertised by the camera's web API
pub const DEFAULT_SERVICE_TYPE: &str = "_gopro-web._tcp.local.";

/// USB vendor id assigned to GoPro
pub const DEFAULT_VENDOR_ID: u16 = 0x2672;

/// Main configuration for gopro-usb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel server port
    pub port: u16,
    /// Channel server listen address
    pub bind_address: String,
    /// mDNS service type to browse
    pub service_type: String,
    /// How long a discovery session browses before giving up
    pub discovery_timeout_ms: u64,
    /// Case-insensitive substring an advertisement name must contain
    pub product_marker: Option<String>,
    /// Address reported when discovery times out (`None` reports no result)
    pub timeout_fallback: Option<String>,
    /// Skip serials whose derived address is not valid IPv4
    pub strict_address: bool,
    /// USB vendor id recognised as a camera
    pub vendor_id: u16,
    /// Poll interval for USB attach/detach detection
    pub usb_poll_interval_ms: u64,
    /// Root of the sysfs USB device tree
    pub sysfs_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8765,
            bind_address: "127.0.0.1".to_string(),
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            discovery_timeout_ms: 10_000,
            product_marker: None,
            timeout_fallback: None,
            strict_address: false,
            vendor_id: DEFAULT_VENDOR_ID,
            usb_poll_interval_ms: 1_000,
            sysfs_root: PathBuf::from("/sys/bus/usb/devices"),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the default config path (~/.config/gopro-usb/config.json)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(Error::NoConfigDir)?;
        Ok(config_dir.join("gopro-usb").join("config.json"))
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load from `path` (or the default path), falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Ok(p) => p,
                Err(e) => {
                    debug!("No config directory ({}), using defaults", e);
                    return Self::default();
                }
            },
        };

        if !path.exists() {
            debug!("No configuration at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Reject values that would make the bridge unusable
    pub fn validate(&self) -> Result<()> {
        if self.discovery_timeout_ms == 0 {
            return Err(Error::Config("discovery_timeout_ms must be positive".into()));
        }
        if self.usb_poll_interval_ms == 0 {
            return Err(Error::Config("usb_poll_interval_ms must be positive".into()));
        }
        if self.service_type.trim().is_empty() {
            return Err(Error::Config("service_type must not be empty".into()));
        }
        Ok(())
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set listen address
    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Builder pattern: set service type
    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Builder pattern: set discovery timeout
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Builder pattern: set product marker
    pub fn with_product_marker(mut self, marker: Option<String>) -> Self {
        self.product_marker = marker;
        self
    }

    /// Builder pattern: set timeout fallback address
    pub fn with_timeout_fallback(mut self, fallback: Option<String>) -> Self {
        self.timeout_fallback = fallback;
        self
    }

    /// Builder pattern: use the well-known camera address on timeout
    pub fn with_default_fallback(self) -> Self {
        self.with_timeout_fallback(Some(FALLBACK_ADDRESS.to_string()))
    }

    /// Builder pattern: set strict address mode
    pub fn with_strict_address(mut self, strict: bool) -> Self {
        self.strict_address = strict;
        self
    }

    /// Builder pattern: set vendor id
    pub fn with_vendor_id(mut self, vendor_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    /// Builder pattern: set USB poll interval
    pub fn with_usb_poll_interval(mut self, interval: Duration) -> Self {
        self.usb_poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Builder pattern: set sysfs root
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn usb_poll_interval(&self) -> Duration {
        Duration::from_millis(self.usb_poll_interval_ms)
    }

    /// Address the channel server listens on
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.service_type, "_gopro-web._tcp.local.");
        assert_eq!(config.vendor_id, 0x2672);
        assert_eq!(config.discovery_timeout(), Duration::from_secs(10));
        assert!(config.timeout_fallback.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .with_port(9000)
            .with_default_fallback()
            .with_product_marker(Some("gopro".into()))
            .with_discovery_timeout(Duration::from_secs(3));
        assert_eq!(config.listen_address(), "127.0.0.1:9000");
        assert_eq!(config.timeout_fallback.as_deref(), Some(FALLBACK_ADDRESS));
        assert_eq!(config.discovery_timeout_ms, 3_000);
    }

    #[test]
    fn test_huge_durations_saturate() {
        let config = Config::new()
            .with_discovery_timeout(Duration::MAX)
            .with_usb_poll_interval(Duration::MAX);
        assert_eq!(config.discovery_timeout_ms, u64::MAX);
        assert_eq!(config.usb_poll_interval_ms, u64::MAX);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "port": 9100, "strict_address": true }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 9100);
        assert!(config.strict_address);
        assert_eq!(config.vendor_id, DEFAULT_VENDOR_ID);
    }

    #[test]
    fn test_load_rejects_zero_timeout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "discovery_timeout_ms": 0 }"#).unwrap();

        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_or_default_tolerates_bad_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(Config::load_or_default(Some(&missing)), Config::default());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "not json").unwrap();
        assert_eq!(Config::load_or_default(Some(&corrupt)), Config::default());
    }
}
