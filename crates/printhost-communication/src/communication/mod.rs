//! Transport abstraction
//!
//! The flow controller never talks to a serial port directly; it goes
//! through [`Transport`], which a real serial port implements and tests
//! replace with a recording mock. `sleep` is part of the trait because the
//! resend recovery path contains required drain delays that tests need to
//! observe without real time passing.

use printhost_core::Result;
use std::time::Duration;

pub mod serial;

/// Byte-level connection to one printer.
///
/// Implementations use interior mutability; the flow controller holds the
/// transport behind an `Arc` and calls it while holding the send lock, so
/// all methods take `&self`.
pub trait Transport: Send + Sync {
    /// Try to open the connection. Safe to call repeatedly; a connected
    /// transport returns `Ok(())` without reopening.
    fn connect(&self) -> Result<()>;

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;

    /// Write the whole buffer. A failed write closes the connection so the
    /// next tick reconnects.
    fn write_bytes(&self, data: &[u8]) -> Result<()>;

    /// Read whatever bytes are available, returning `Ok(0)` when nothing
    /// arrived within the poll timeout.
    fn read_available(&self, buf: &mut [u8]) -> Result<usize>;

    /// Block the calling thread. The resend path relies on this for its
    /// UART drain delays.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Close the connection.
    fn close(&self);
}
