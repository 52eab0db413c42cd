//! Shared value types and protocol constants

use serde::{Deserialize, Serialize};

/// Upper bound on the sent-command history kept for resend requests.
///
/// Firmwares request resends of recent lines only; 40 commands comfortably
/// covers the deepest firmware input buffers at the protocol's line lengths.
pub const MAX_HISTORY_SIZE: usize = 40;

/// Log-type mask bits attached to every response log entry.
///
/// Stable ABI with the web frontend: a frontend subscribes with an OR of the
/// bits it wants and must never see these values change meaning.
pub mod logmask {
    /// Command sent to the printer.
    pub const SENT: u8 = 1;
    /// Acknowledgement (`ok`, `wait`).
    pub const ACK: u8 = 2;
    /// Informational firmware chatter (banners, echoes).
    pub const INFO: u8 = 4;
    /// Error reported by the firmware or the transport.
    pub const ERROR: u8 = 8;
    /// Telemetry response (temperatures, coordinates).
    pub const RESPONSE: u8 = 16;
    /// Every bit set.
    pub const ALL: u8 = SENT | ACK | INFO | ERROR | RESPONSE;
}

/// A cartesian position with extrusion axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub e: f32,
}

impl Position {
    /// Create a new position
    pub fn new(x: f32, y: f32, z: f32, e: f32) -> Self {
        Self { x, y, z, e }
    }
}
