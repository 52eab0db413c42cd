//! # printhost
//!
//! A host-side print server for serial-attached 3D printers:
//! - RepRap G-code protocol with checksummed ASCII and binary framing
//! - Ping-pong and cache-window flow control with line-numbered resends
//! - Derived printer state (temperatures, position, tool, fan)
//! - A bounded, cursor-addressable response log for the web frontend
//!
//! ## Architecture
//!
//! printhost is organized as a workspace with multiple crates:
//!
//! 1. **printhost-core** - Error types, log-mask ABI, shared types
//! 2. **printhost-settings** - Global and per-printer configuration
//! 3. **printhost-communication** - Transport, G-code codec, flow control
//! 4. **printhost** - Main binary that supervises the printer tasks

pub use printhost_communication::{
    FlowController, GCode, GCodeDataPacket, HostCommandRegistry, Printer, PrinterResponse,
    PrinterState, ResponseKind, ResponseLog, SerialTransport, StatusSnapshot, Transport,
};
pub use printhost_core::{logmask, ConfigError, ConnectionError, Error, ProtocolError, Result};
pub use printhost_settings::{GlobalConfig, PrinterConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with console output, honoring the `RUST_LOG`
/// environment variable and defaulting to INFO.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
