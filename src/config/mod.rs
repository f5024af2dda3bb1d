//!
//! Typed configuration surface consumed from a preferences/XML loader collaborator.
//!

pub mod error;

use serde::{Deserialize, Serialize};

use error::ConfigError;

/// Serial parity, mapped 1:1 from the `N`/`E`/`O` preferences character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    pub(crate) fn to_serialport(self) -> serialport::Parity {
        match self {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        }
    }
}

/// Serial stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    pub(crate) fn to_serialport(self) -> serialport::StopBits {
        match self {
            // the underlying OS serial stack only distinguishes One/Two; 1.5 stop bits
            // is a framing nicety most drivers round to Two.
            StopBits::One => serialport::StopBits::One,
            StopBits::OnePointFive | StopBits::Two => serialport::StopBits::Two,
        }
    }
}

///
/// A firmware version, reported by the device in response to a VERSION request.
///
/// # Fields:
/// - `major`: `version_code / 100`
/// - `minor`: `version_code % 100`
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    ///
    /// Splits a raw VERSION response code into major/minor components.
    ///
    /// # Parameters:
    /// - `code`: The u16 version code reported by the device, e.g. `101` for 1.1
    ///
    pub fn from_code(code: u16) -> Version {
        Version { major: code / 100, minor: code % 100 }
    }
}

impl Default for Version {
    fn default() -> Version {
        Version { major: 1, minor: 1 }
    }
}

///
/// Line parameters for the physical serial device.
/// All fields have an associated getter function.
///
/// # Fields:
/// - `port_name`: The OS-visible serial device
/// - `baud_rate`: The requested baud rate
/// - `parity`: N/E/O
/// - `data_bits`: Must be 8
/// - `stop_bits`: 1, 1.5, or 2
///
#[derive(Debug, Clone, getset::Getters, Serialize, Deserialize)]
#[get = "pub"]
pub struct LinkConfig {
    port_name: String,
    baud_rate: u32,
    parity: Parity,
    data_bits: u8,
    stop_bits: StopBits,
}

impl LinkConfig {
    ///
    /// Creates a new `LinkConfig`, validating that `data_bits == 8`.
    ///
    /// # Returns:
    /// - A validated `LinkConfig`
    /// - `ConfigError::InvalidDataBits` if `data_bits != 8`
    ///
    pub fn new(port_name: impl Into<String>, baud_rate: u32, parity: Parity, data_bits: u8, stop_bits: StopBits) -> Result<LinkConfig, ConfigError> {
        if data_bits != 8 {
            return Err(ConfigError::InvalidDataBits { requested: data_bits });
        }

        Ok(LinkConfig { port_name: port_name.into(), baud_rate, parity, data_bits, stop_bits })
    }
}

///
/// Driver-level timing and handshake configuration.
/// All fields have an associated getter function.
///
/// # Fields:
/// - `minimum_firmware_version`: Handshake fails below this version
/// - `preferred_firmware_version`: Informational; not currently enforced
/// - `host_protocol_version`: Sent as the VERSION request argument
/// - `handshake_timeout_ms`: Read timeout while waiting for VERSION during startup
/// - `reset_settle_ms`: Sleep duration after a DTR reset pulse
/// - `overflow_backoff_ms`: Sleep duration between BUFFER_OVERFLOW retries
/// - `port_retry_interval_ms`: Sleep duration between failed port-open attempts
///
#[derive(Debug, Clone, getset::Getters, Serialize, Deserialize)]
#[get = "pub"]
pub struct DriverConfig {
    pub(crate) minimum_firmware_version: Version,
    pub(crate) preferred_firmware_version: Version,
    pub(crate) host_protocol_version: u16,
    pub(crate) handshake_timeout_ms: u32,
    pub(crate) reset_settle_ms: u64,
    pub(crate) overflow_backoff_ms: u64,
    pub(crate) port_retry_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> DriverConfig {
        DriverConfig {
            minimum_firmware_version: Version { major: 1, minor: 1 },
            preferred_firmware_version: Version { major: 1, minor: 1 },
            host_protocol_version: 100,
            handshake_timeout_ms: 8_000,
            reset_settle_ms: 3_000,
            overflow_backoff_ms: 25,
            port_retry_interval_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_splits_major_minor() {
        assert_eq!(Version::from_code(101), Version { major: 1, minor: 1 });
        assert_eq!(Version::from_code(205), Version { major: 2, minor: 5 });
    }

    #[test]
    fn link_config_rejects_non_8_data_bits() {
        let err = LinkConfig::new("/dev/ttyACM0", 115200, Parity::None, 7, StopBits::One).unwrap_err();
        assert_eq!(err, ConfigError::InvalidDataBits { requested: 7 });
    }

    #[test]
    fn link_config_accepts_8_data_bits() {
        assert!(LinkConfig::new("/dev/ttyACM0", 115200, Parity::None, 8, StopBits::One).is_ok());
    }

    #[test]
    fn driver_config_defaults_match_spec() {
        let cfg = DriverConfig::default();
        assert_eq!(*cfg.minimum_firmware_version(), Version { major: 1, minor: 1 });
        assert_eq!(*cfg.handshake_timeout_ms(), 8_000);
        assert_eq!(*cfg.reset_settle_ms(), 3_000);
        assert_eq!(*cfg.overflow_backoff_ms(), 25);
    }
}
