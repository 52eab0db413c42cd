//! Global host configuration

use printhost_core::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_backlog_size() -> usize {
    1000
}

fn default_ports() -> String {
    "4000".to_string()
}

/// Host-wide configuration, loaded once at startup.
///
/// Passed explicitly into each printer at construction; there is no global
/// singleton.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Capacity of each printer's response ring buffer.
    #[serde(rename = "backlogSize", default = "default_backlog_size")]
    pub backlog_size: usize,

    /// Listen port string for the web frontend collaborator.
    #[serde(default = "default_ports")]
    pub ports: String,

    /// Directory containing one TOML file per printer.
    #[serde(rename = "printerDir")]
    pub printer_dir: PathBuf,
}

impl GlobalConfig {
    /// Load the global configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            file: file.clone(),
            source,
        })?;
        let config: GlobalConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            file,
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Paths of all printer configuration files in `printer_dir`.
    ///
    /// Only `*.toml` entries are considered; the list is sorted so printers
    /// start in a stable order.
    pub fn printer_config_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let entries =
            std::fs::read_dir(&self.printer_dir).map_err(|source| ConfigError::Io {
                file: self.printer_dir.display().to_string(),
                source,
            })?;
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::Io {
                file: self.printer_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let config: GlobalConfig = toml::from_str("printerDir = \"/etc/printhost/printers\"")
            .expect("minimal config should parse");
        assert_eq!(config.backlog_size, 1000);
        assert_eq!(config.ports, "4000");
        assert_eq!(config.printer_dir, PathBuf::from("/etc/printhost/printers"));
    }

    #[test]
    fn parses_explicit_values() {
        let config: GlobalConfig = toml::from_str(
            "backlogSize = 50\nports = \"8080\"\nprinterDir = \"/tmp/printers\"",
        )
        .unwrap();
        assert_eq!(config.backlog_size, 50);
        assert_eq!(config.ports, "8080");
    }

    #[test]
    fn missing_printer_dir_is_a_parse_error() {
        let result: std::result::Result<GlobalConfig, _> = toml::from_str("ports = \"4000\"");
        assert!(result.is_err());
    }
}
