//! RepRap firmware protocol
//!
//! - [`response`] — classification of firmware reply lines
//! - [`state`] — derived printer state (line numbers, temperatures, position)
//! - [`log`] — the bounded, cursor-addressable response log
//! - [`flow`] — the flow-control state machine that owns the command queues

pub mod flow;
pub mod log;
pub mod response;
pub mod state;

pub use flow::{FlowController, FlowRegime, HostCommandRegistry};
pub use log::{PrinterResponse, ResponseLog};
pub use response::{classify, extract, ResponseKind};
pub use state::PrinterState;
