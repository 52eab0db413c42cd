//! Per-printer configuration
//!
//! Each printer is described by one TOML file:
//!
//! ```toml
//! active = true
//!
//! [printer]
//! name = "Mendel"
//! slugName = "mendel"
//!
//! [printer.connection]
//! device = "/dev/ttyUSB0"
//! baudrate = 115200
//! pingPong = false
//! readCacheSize = 63
//! protocol = 0          # 0 = ASCII, anything else = binary
//! okAfterResend = true
//!
//! [printer.dimension]
//! xmin = 0.0
//! ymin = 0.0
//! zmin = 0.0
//! xmax = 200.0
//! ymax = 200.0
//! zmax = 100.0
//!
//! [printer.homing]
//! xhome = 0.0
//! yhome = 0.0
//! zhome = 0.0
//!
//! [printer.extruder]
//! count = 1
//!
//! [printer.speed]
//! xaxis = 12000.0
//! yaxis = 12000.0
//! zaxis = 100.0
//! eaxisExtrude = 100.0
//! eaxisRetract = 1000.0
//! ```
//!
//! Every key above is required except `active` (default true). The raw file
//! is deserialized into `Option` mirror structs and validated field by field
//! so a missing key is reported with its full dotted path instead of a serde
//! one-liner.

use printhost_core::{ConfigError, Result};
use serde::Deserialize;
use std::path::Path;

/// Immutable configuration of a single printer.
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    pub name: String,
    pub slug: String,
    pub device: String,
    pub baudrate: u32,
    /// True: firmware sends one `ok` per command, host sends one at a time.
    /// False: host tracks the firmware input buffer fill instead.
    pub ping_pong: bool,
    /// Firmware input buffer size in bytes. Meaningful only when
    /// `ping_pong` is false.
    pub receive_cache_size: u16,
    /// Use the compact binary framing instead of checksummed ASCII.
    pub binary_protocol: bool,
    /// Firmware sends an extra `ok` after honoring a resend request.
    pub ok_after_resend: bool,
    pub xmin: f64,
    pub ymin: f64,
    pub zmin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub zmax: f64,
    pub home_x: f64,
    pub home_y: f64,
    pub home_z: f64,
    pub extruder_count: u32,
    pub speed_x: f64,
    pub speed_y: f64,
    pub speed_z: f64,
    pub speed_e_extrude: f64,
    pub speed_e_retract: f64,
    /// Inactive printers are loaded but never started.
    pub active: bool,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    active: Option<bool>,
    printer: Option<RawPrinter>,
}

#[derive(Debug, Deserialize)]
struct RawPrinter {
    name: Option<String>,
    #[serde(rename = "slugName")]
    slug_name: Option<String>,
    connection: Option<RawConnection>,
    dimension: Option<RawDimension>,
    homing: Option<RawHoming>,
    extruder: Option<RawExtruder>,
    speed: Option<RawSpeed>,
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    device: Option<String>,
    baudrate: Option<u32>,
    #[serde(rename = "pingPong")]
    ping_pong: Option<bool>,
    #[serde(rename = "readCacheSize")]
    read_cache_size: Option<u16>,
    protocol: Option<i64>,
    #[serde(rename = "okAfterResend")]
    ok_after_resend: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawDimension {
    xmin: Option<f64>,
    ymin: Option<f64>,
    zmin: Option<f64>,
    xmax: Option<f64>,
    ymax: Option<f64>,
    zmax: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawHoming {
    xhome: Option<f64>,
    yhome: Option<f64>,
    zhome: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawExtruder {
    count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawSpeed {
    xaxis: Option<f64>,
    yaxis: Option<f64>,
    zaxis: Option<f64>,
    #[serde(rename = "eaxisExtrude")]
    eaxis_extrude: Option<f64>,
    #[serde(rename = "eaxisRetract")]
    eaxis_retract: Option<f64>,
}

fn require<T>(value: Option<T>, key: &str, file: &str) -> Result<T> {
    value.ok_or_else(|| {
        ConfigError::MissingKey {
            key: key.to_string(),
            file: file.to_string(),
        }
        .into()
    })
}

impl PrinterConfig {
    /// Load and validate a printer configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            file: file.clone(),
            source,
        })?;
        let parsed: RawFile = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            file: file.clone(),
            reason: e.to_string(),
        })?;
        Self::validate(parsed, &file)
    }

    /// Parse a configuration from an in-memory TOML string.
    pub fn from_toml(raw: &str, file: &str) -> Result<Self> {
        let parsed: RawFile = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            file: file.to_string(),
            reason: e.to_string(),
        })?;
        Self::validate(parsed, file)
    }

    fn validate(parsed: RawFile, file: &str) -> Result<Self> {
        let printer = require(parsed.printer, "printer", file)?;
        let connection = require(printer.connection, "printer.connection", file)?;
        let dimension = require(printer.dimension, "printer.dimension", file)?;
        let homing = require(printer.homing, "printer.homing", file)?;
        let extruder = require(printer.extruder, "printer.extruder", file)?;
        let speed = require(printer.speed, "printer.speed", file)?;

        let config = PrinterConfig {
            name: require(printer.name, "printer.name", file)?,
            slug: require(printer.slug_name, "printer.slugName", file)?,
            device: require(connection.device, "printer.connection.device", file)?,
            baudrate: require(connection.baudrate, "printer.connection.baudrate", file)?,
            ping_pong: require(connection.ping_pong, "printer.connection.pingPong", file)?,
            receive_cache_size: require(
                connection.read_cache_size,
                "printer.connection.readCacheSize",
                file,
            )?,
            binary_protocol: require(connection.protocol, "printer.connection.protocol", file)?
                != 0,
            ok_after_resend: require(
                connection.ok_after_resend,
                "printer.connection.okAfterResend",
                file,
            )?,
            xmin: require(dimension.xmin, "printer.dimension.xmin", file)?,
            ymin: require(dimension.ymin, "printer.dimension.ymin", file)?,
            zmin: require(dimension.zmin, "printer.dimension.zmin", file)?,
            xmax: require(dimension.xmax, "printer.dimension.xmax", file)?,
            ymax: require(dimension.ymax, "printer.dimension.ymax", file)?,
            zmax: require(dimension.zmax, "printer.dimension.zmax", file)?,
            home_x: require(homing.xhome, "printer.homing.xhome", file)?,
            home_y: require(homing.yhome, "printer.homing.yhome", file)?,
            home_z: require(homing.zhome, "printer.homing.zhome", file)?,
            extruder_count: require(extruder.count, "printer.extruder.count", file)?,
            speed_x: require(speed.xaxis, "printer.speed.xaxis", file)?,
            speed_y: require(speed.yaxis, "printer.speed.yaxis", file)?,
            speed_z: require(speed.zaxis, "printer.speed.zaxis", file)?,
            speed_e_extrude: require(speed.eaxis_extrude, "printer.speed.eaxisExtrude", file)?,
            speed_e_retract: require(speed.eaxis_retract, "printer.speed.eaxisRetract", file)?,
            active: require(parsed.active, "active", file)?,
        };

        tracing::debug!(
            printer = %config.name,
            device = %config.device,
            "printer configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE: &str = r#"
active = true

[printer]
name = "Mendel"
slugName = "mendel"

[printer.connection]
device = "/dev/ttyUSB0"
baudrate = 115200
pingPong = false
readCacheSize = 63
protocol = 0
okAfterResend = true

[printer.dimension]
xmin = 0.0
ymin = 0.0
zmin = 0.0
xmax = 200.0
ymax = 200.0
zmax = 100.0

[printer.homing]
xhome = 0.0
yhome = 0.0
zhome = 0.0

[printer.extruder]
count = 2

[printer.speed]
xaxis = 12000.0
yaxis = 12000.0
zaxis = 100.0
eaxisExtrude = 100.0
eaxisRetract = 1000.0
"#;

    #[test]
    fn complete_config_loads() {
        let config = PrinterConfig::from_toml(COMPLETE, "test.toml").unwrap();
        assert_eq!(config.name, "Mendel");
        assert_eq!(config.slug, "mendel");
        assert_eq!(config.baudrate, 115200);
        assert!(!config.ping_pong);
        assert_eq!(config.receive_cache_size, 63);
        assert!(!config.binary_protocol);
        assert!(config.ok_after_resend);
        assert_eq!(config.extruder_count, 2);
        assert!(config.active);
    }

    #[test]
    fn missing_key_names_full_path() {
        let incomplete = COMPLETE.replace("device = \"/dev/ttyUSB0\"\n", "");
        let err = PrinterConfig::from_toml(&incomplete, "test.toml").unwrap_err();
        let message = err.to_string();
        assert!(
            message.contains("printer.connection.device"),
            "unexpected error: {message}"
        );
    }

    #[test]
    fn missing_active_flag_is_fatal() {
        let incomplete = COMPLETE.replace("active = true\n", "");
        let err = PrinterConfig::from_toml(&incomplete, "test.toml").unwrap_err();
        assert!(err.to_string().contains("'active'"));
    }

    #[test]
    fn nonzero_protocol_selects_binary() {
        let binary = COMPLETE.replace("protocol = 0", "protocol = 1");
        let config = PrinterConfig::from_toml(&binary, "test.toml").unwrap();
        assert!(config.binary_protocol);
    }
}
