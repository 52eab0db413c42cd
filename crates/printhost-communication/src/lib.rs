//! # printhost-communication
//!
//! The per-printer communication engine:
//! - `communication` — the serial transport behind a stubbable trait
//! - `gcode` — parsing and wire framing of G-code commands (checksummed
//!   ASCII and the compact binary packet format)
//! - `firmware` — the RepRap firmware protocol: response classification,
//!   derived printer state, the flow-control state machine, and the bounded
//!   response log consumed by the web frontend
//! - `printer` — the printer facade and its worker task

pub mod communication;
pub mod firmware;
pub mod gcode;
pub mod printer;

pub use communication::{serial::SerialTransport, Transport};
pub use firmware::reprap::{
    FlowController, HostCommandRegistry, PrinterResponse, PrinterState, ResponseKind, ResponseLog,
};
pub use gcode::{GCode, GCodeDataPacket};
pub use printer::{ExtruderSlot, Printer, StatusSnapshot};
