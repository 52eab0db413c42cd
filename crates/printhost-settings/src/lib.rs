//! # printhost-settings
//!
//! Configuration loading for printhost.
//!
//! Two kinds of configuration files, both TOML:
//! - the global configuration (response backlog size, frontend listen ports,
//!   printer configuration directory)
//! - one file per printer (connection parameters, geometry, homing corner,
//!   feedrates, extruder count)
//!
//! Per-printer files keep the dotted key hierarchy the server has always
//! used (`printer.connection.pingPong`, `printer.dimension.xmax`, ...), so a
//! missing key can be reported with its full path.

pub mod global;
pub mod printer;

pub use global::GlobalConfig;
pub use printer::PrinterConfig;
