//! Serial port transport
//!
//! Opens the printer's TTY with a short read timeout so the printer task's
//! IO loop can poll for responses without blocking the tick cadence.

use super::Transport;
use parking_lot::Mutex;
use printhost_core::{ConnectionError, Result};
use std::io::{Read, Write};
use std::time::Duration;

/// Blanket trait for the boxed port object.
pub trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

/// Poll timeout for reads. Short enough that the IO loop stays responsive,
/// long enough to avoid spinning.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Serial transport over the `serialport` crate.
pub struct SerialTransport {
    device: String,
    baudrate: u32,
    port: Mutex<Option<Box<dyn ReadWrite>>>,
}

impl SerialTransport {
    /// Create a transport for the given device path. Does not open the port;
    /// the printer task calls [`Transport::connect`] on its tick.
    pub fn new(device: impl Into<String>, baudrate: u32) -> Self {
        Self {
            device: device.into(),
            baudrate,
            port: Mutex::new(None),
        }
    }
}

impl Transport for SerialTransport {
    fn connect(&self) -> Result<()> {
        let mut guard = self.port.lock();
        if guard.is_some() {
            return Ok(());
        }
        match serialport::new(&self.device, self.baudrate)
            .timeout(READ_TIMEOUT)
            .open()
        {
            Ok(port) => {
                tracing::info!(device = %self.device, baudrate = self.baudrate, "serial port opened");
                *guard = Some(Box::new(port));
                Ok(())
            }
            Err(e) => {
                tracing::debug!(device = %self.device, error = %e, "serial open failed");
                Err(ConnectionError::FailedToOpen {
                    port: self.device.clone(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.port.lock().is_some()
    }

    fn write_bytes(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.port.lock();
        let port = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        match port.write_all(data).and_then(|_| port.flush()) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(device = %self.device, error = %e, "serial write failed, closing port");
                *guard = None;
                Err(ConnectionError::ConnectionLost {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn read_available(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.port.lock();
        let port = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                tracing::warn!(device = %self.device, error = %e, "serial read failed, closing port");
                *guard = None;
                Err(ConnectionError::ConnectionLost {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn close(&self) {
        let mut guard = self.port.lock();
        if guard.take().is_some() {
            tracing::info!(device = %self.device, "serial port closed");
        }
    }
}
