//! Shared test support: a transport that records everything and moves no
//! real bytes.
#![allow(dead_code)]

use parking_lot::Mutex;
use printhost_communication::Transport;
use printhost_core::{ConnectionError, Result};
use printhost_settings::PrinterConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Transport stub: records written packets and requested sleeps, and serves
/// scripted bytes to the read side.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    writes: Mutex<Vec<Vec<u8>>>,
    sleeps: Mutex<Vec<Duration>>,
    readable: Mutex<VecDeque<u8>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every packet written so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Written packets decoded as strings (lossy), in order.
    pub fn written_lines(&self) -> Vec<String> {
        self.writes
            .lock()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }

    /// Sleeps the flow controller requested, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Queue bytes for the read side to deliver.
    pub fn push_readable(&self, bytes: &[u8]) {
        self.readable.lock().extend(bytes.iter().copied());
    }
}

impl Transport for MockTransport {
    fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn write_bytes(&self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected.into());
        }
        self.writes.lock().push(data.to_vec());
        Ok(())
    }

    fn read_available(&self, buf: &mut [u8]) -> Result<usize> {
        let mut readable = self.readable.lock();
        let n = readable.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
            *slot = readable.pop_front().unwrap();
        }
        Ok(n)
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// A printer configuration for tests; only the flow-control knobs vary.
pub fn test_config(ping_pong: bool, receive_cache_size: u16, binary_protocol: bool) -> PrinterConfig {
    PrinterConfig {
        name: "Testprinter".to_string(),
        slug: "testprinter".to_string(),
        device: "/dev/null".to_string(),
        baudrate: 115_200,
        ping_pong,
        receive_cache_size,
        binary_protocol,
        ok_after_resend: true,
        xmin: 0.0,
        ymin: 0.0,
        zmin: 0.0,
        xmax: 200.0,
        ymax: 200.0,
        zmax: 100.0,
        home_x: 0.0,
        home_y: 0.0,
        home_z: 0.0,
        extruder_count: 1,
        speed_x: 12_000.0,
        speed_y: 12_000.0,
        speed_z: 100.0,
        speed_e_extrude: 100.0,
        speed_e_retract: 1_000.0,
        active: true,
    }
}
