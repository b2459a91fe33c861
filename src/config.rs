//! # Configuration Management
//!
//! This module loads runtime settings from `epaper-config.toml`: the access point the
//! QR code advertises, the HTTP listen address, the panel geometry and wiring, and
//! where the submitted message is stored. Every section has defaults, so a partial
//! file (or no file at all) still gives a working board.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "epaper-config.toml";

/// Application configuration loaded from epaper-config.toml
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// WiFi network advertised in the join QR code
    pub access_point: AccessPointConfig,
    /// HTTP server settings
    pub server: ServerConfig,
    /// Panel geometry and QR screen timing
    pub display: DisplayConfig,
    /// Where the message and font size are persisted
    pub storage: StorageConfig,
}

/// WiFi access point credentials and the board's address on that network
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub password: String,
    /// IPv4 address encoded in the web QR code
    pub address: Ipv4Addr,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket the HTTP server binds to
    pub listen: SocketAddr,
}

/// Display and QR screen configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Native panel width in pixels
    pub width: u32,
    /// Native panel height in pixels
    pub height: u32,
    /// Quarter turns clockwise applied once at startup
    pub rotation: u8,
    /// How long the QR codes stay up after boot
    pub qr_duration_secs: u64,
    /// Target edge length of each QR code in pixels
    pub qr_target_size: u32,
    /// SPI/GPIO wiring, used with the `hardware` feature
    pub hardware: HardwareConfig,
}

/// Linux device nodes and GPIO line offsets for the e-paper panel
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HardwareConfig {
    pub spi_device: PathBuf,
    pub gpio_chip: PathBuf,
    /// Data/Command select
    pub dc_pin: u32,
    pub rst_pin: u32,
    /// Busy signal, low while the controller works
    pub busy_pin: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub settings_path: PathBuf,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        AccessPointConfig {
            ssid: "E-Paper-Message".to_string(),
            password: "12345678".to_string(),
            address: Ipv4Addr::new(192, 168, 4, 1),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: SocketAddr::from(([0, 0, 0, 0], 80)),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            width: 240,  // 3.7" panel, native portrait
            height: 416,
            rotation: 1, // landscape
            qr_duration_secs: 60,
            qr_target_size: 175,
            hardware: HardwareConfig::default(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        HardwareConfig {
            spi_device: PathBuf::from("/dev/spidev0.0"),
            gpio_chip: PathBuf::from("/dev/gpiochip0"),
            dc_pin: 25,
            rst_pin: 17,
            busy_pin: 24,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            settings_path: PathBuf::from("epaper-settings.json"),
        }
    }
}

impl DisplayConfig {
    pub fn qr_duration(&self) -> Duration {
        Duration::from_secs(self.qr_duration_secs)
    }
}

impl Config {
    /// Load configuration from epaper-config.toml in the working directory
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        ssid = %config.access_point.ssid,
                        "loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config file format, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        }
    }
}
