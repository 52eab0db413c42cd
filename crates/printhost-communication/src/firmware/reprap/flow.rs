//! Flow-control state machine
//!
//! Owns the three command queues (resend > manual > job), the bounded send
//! history, and the flow regime that decides when the next packet may go
//! out. Implements the ack/resend protocol:
//! - ping-pong: one command in flight, gated on `ok`
//! - cache window: the host mirrors the firmware's input buffer fill and
//!   keeps several commands in flight
//!
//! All mutation happens under the owning printer's send lock; this type
//! itself is plain data.

use super::log::ResponseLog;
use super::response::{classify, ResponseKind};
use super::state::PrinterState;
use crate::communication::Transport;
use crate::gcode::{GCode, GCodeDataPacket};
use printhost_core::{logmask, ProtocolError, MAX_HISTORY_SIZE};
use printhost_settings::PrinterConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Consecutive resend errors tolerated before the connection is dropped.
const RESEND_STORM_LIMIT: u32 = 5;

/// Firmware `wait` after this much send silence means the window is stale.
const WAIT_RESYNC_AFTER: Duration = Duration::from_secs(5);

/// The tick keeps this many manual slots topped up with telemetry queries.
const MANUAL_QUEUE_LOW_WATER: usize = 5;

/// Handler invoked for a registered `@` command.
pub type HostCommandHandler = Box<dyn Fn(&GCode) + Send>;

/// Name-keyed registry for `@` host commands.
///
/// Empty by default; collaborators register handlers for the commands they
/// own. Unregistered commands are consumed and logged.
#[derive(Default)]
pub struct HostCommandRegistry {
    handlers: HashMap<String, HostCommandHandler>,
}

impl HostCommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `@<name>`.
    pub fn register(&mut self, name: impl Into<String>, handler: HostCommandHandler) {
        self.handlers.insert(name.into(), handler);
    }

    /// Dispatch a host command to its handler. Returns false when no
    /// handler is registered for it.
    pub fn dispatch(&self, gcode: &GCode) -> bool {
        let name = gcode
            .text()
            .unwrap_or("")
            .split_whitespace()
            .next()
            .unwrap_or("");
        match self.handlers.get(name) {
            Some(handler) => {
                handler(gcode);
                true
            }
            None => false,
        }
    }
}

/// The two flow-control regimes, as one dispatch point.
#[derive(Debug)]
pub enum FlowRegime {
    /// One command in flight; the next send waits for `ok`.
    PingPong { ready_for_next_send: bool },
    /// Host-tracked firmware input buffer: `window` holds the byte lengths
    /// of sent-but-unacknowledged packets, `fill` their sum.
    CacheWindow {
        size: u16,
        fill: u16,
        window: VecDeque<u16>,
    },
}

impl FlowRegime {
    fn for_config(config: &PrinterConfig) -> Self {
        if config.ping_pong {
            FlowRegime::PingPong {
                ready_for_next_send: true,
            }
        } else {
            FlowRegime::CacheWindow {
                size: config.receive_cache_size,
                fill: 0,
                window: VecDeque::new(),
            }
        }
    }

    /// Whether a packet of `len` bytes may go out now.
    fn can_send(&self, len: usize) -> bool {
        match self {
            FlowRegime::PingPong {
                ready_for_next_send,
            } => *ready_for_next_send,
            FlowRegime::CacheWindow { size, fill, .. } => *fill as usize + len <= *size as usize,
        }
    }

    fn note_sent(&mut self, len: u16) {
        match self {
            FlowRegime::PingPong {
                ready_for_next_send,
            } => *ready_for_next_send = false,
            FlowRegime::CacheWindow { fill, window, .. } => {
                *fill += len;
                window.push_back(len);
            }
        }
    }

    fn note_ok(&mut self) {
        match self {
            FlowRegime::PingPong {
                ready_for_next_send,
            } => *ready_for_next_send = true,
            FlowRegime::CacheWindow { fill, window, .. } => {
                // An `ok` with an empty window means we resynced underneath
                // it; saturate rather than corrupt the fill count.
                match window.pop_front() {
                    Some(len) => *fill = fill.saturating_sub(len),
                    None => *fill = 0,
                }
            }
        }
    }

    /// Declare the firmware buffer empty (reboot, resend recovery, stale
    /// `wait`).
    fn resync(&mut self) {
        match self {
            FlowRegime::PingPong {
                ready_for_next_send,
            } => *ready_for_next_send = true,
            FlowRegime::CacheWindow { fill, window, .. } => {
                window.clear();
                *fill = 0;
            }
        }
    }
}

/// Per-printer flow-control engine. Sole mutator of the write side.
pub struct FlowController {
    config: Arc<PrinterConfig>,
    transport: Arc<dyn Transport>,
    log: Arc<ResponseLog>,
    state: PrinterState,
    manual_commands: VecDeque<String>,
    job_commands: VecDeque<String>,
    resend_lines: VecDeque<Arc<GCode>>,
    history: VecDeque<Arc<GCode>>,
    regime: FlowRegime,
    host_commands: HostCommandRegistry,
    garbage_cleared: bool,
    ignore_next_ok: bool,
    paused: bool,
    resend_error: u32,
    errors_received: u32,
    lines_sent: u64,
    bytes_sent: u64,
    last_command_sent_at: Instant,
    wait_resync_after: Duration,
}

impl FlowController {
    pub fn new(
        config: Arc<PrinterConfig>,
        transport: Arc<dyn Transport>,
        log: Arc<ResponseLog>,
    ) -> Self {
        let regime = FlowRegime::for_config(&config);
        let state = PrinterState::new(config.extruder_count as usize);
        Self {
            config,
            transport,
            log,
            state,
            manual_commands: VecDeque::new(),
            job_commands: VecDeque::new(),
            resend_lines: VecDeque::new(),
            history: VecDeque::new(),
            regime,
            host_commands: HostCommandRegistry::new(),
            garbage_cleared: false,
            ignore_next_ok: false,
            paused: false,
            resend_error: 0,
            errors_received: 0,
            lines_sent: 0,
            bytes_sent: 0,
            last_command_sent_at: Instant::now(),
            wait_resync_after: WAIT_RESYNC_AFTER,
        }
    }

    /// Queue a user command and try to get it out immediately.
    pub fn enqueue_manual(&mut self, line: String) {
        self.manual_commands.push_back(line);
        self.try_send_next();
    }

    /// Queue a job command. The tick moves it; jobs arrive in bulk and the
    /// stream is already running, so there is nothing to hurry.
    pub fn enqueue_job(&mut self, line: String) {
        self.job_commands.push_back(line);
    }

    /// Suppress or resume the job queue. Manual commands keep flowing.
    pub fn pause(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Close the connection.
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Whether a resend is still being worked off.
    pub fn resends_pending(&self) -> bool {
        !self.resend_lines.is_empty()
    }

    /// One-second cadence: reconnect when the port is gone, otherwise keep
    /// the firmware buffer fed and the temperature telemetry fresh.
    pub fn on_tick(&mut self) {
        if !self.transport.is_connected() {
            if self.transport.connect().is_ok() {
                // Fresh connection: the firmware's input stream boundary is
                // unknown until a `start` or an `ok` proves it.
                self.garbage_cleared = false;
                self.regime.resync();
            }
        } else if self.manual_commands.len() < MANUAL_QUEUE_LOW_WATER {
            self.manual_commands.push_back("M105".to_string());
        }
        self.try_send_next();
    }

    /// Feed one firmware reply line through the state machine.
    pub fn on_response(&mut self, raw: &str) {
        let line = raw.trim_start_matches(|c: char| (c as u32) < 32);
        if line.is_empty() {
            return;
        }
        let mut mask = logmask::INFO;
        self.state.analyze_response(line, &mut mask);
        let kind = classify(line);

        // A boot banner resets everything. While the stream boundary is
        // still dirty, accept `start` anywhere in the line; afterwards only
        // as a prefix.
        if kind == ResponseKind::FirmwareReboot
            || (!self.garbage_cleared && line.contains("start"))
        {
            self.on_firmware_reboot();
        }

        match kind {
            ResponseKind::ResendRequest(n) => self.handle_resend(n),
            ResponseKind::Ok => {
                mask = (mask & !logmask::INFO) | logmask::ACK;
                self.garbage_cleared = true;
                if self.ignore_next_ok {
                    // The `ok` that follows a honored resend acknowledges
                    // nothing we still track.
                    self.ignore_next_ok = false;
                } else {
                    self.regime.note_ok();
                    self.resend_error = 0;
                }
            }
            ResponseKind::Wait => {
                mask = (mask & !logmask::INFO) | logmask::ACK;
                if self.last_command_sent_at.elapsed() > self.wait_resync_after {
                    // The firmware is idle but our window claims bytes in
                    // flight: an ack was lost. Start the window over.
                    tracing::debug!(printer = %self.config.name, "wait with stale window, resyncing");
                    self.regime.resync();
                }
                self.resend_error = 0;
            }
            ResponseKind::Error => {
                mask = (mask & !logmask::INFO) | logmask::ERROR;
                tracing::warn!(printer = %self.config.name, line, "firmware error");
            }
            ResponseKind::FirmwareReboot | ResponseKind::Info => {}
        }

        self.log.push(line, mask);
        self.try_send_next();
    }

    fn on_firmware_reboot(&mut self) {
        tracing::info!(printer = %self.config.name, "firmware reboot detected, resetting protocol state");
        self.state.reset();
        self.history.clear();
        self.resend_lines.clear();
        self.regime.resync();
        self.garbage_cleared = true;
        self.ignore_next_ok = false;
        if !self.job_commands.is_empty() {
            // Continuing the old job makes no sense after a reboot.
            tracing::warn!(
                printer = %self.config.name,
                dropped = self.job_commands.len(),
                "abandoning job after firmware reboot"
            );
            self.job_commands.clear();
        }
    }

    /// Try to dispatch the highest-priority queued command.
    pub fn try_send_next(&mut self) {
        if !self.garbage_cleared {
            return;
        }
        if let FlowRegime::PingPong {
            ready_for_next_send,
        } = &self.regime
        {
            if !ready_for_next_send {
                return;
            }
        }
        if !self.transport.is_connected() {
            return;
        }

        // Old communication problems come first; the resend blocks the pipe.
        if let Some(gcode) = self.resend_lines.front().cloned() {
            let packet = self.serialize(&gcode);
            if self.try_send_packet(&packet, &gcode) {
                self.resend_lines.pop_front();
            }
            return;
        }
        if self.resend_error > 0 {
            self.resend_error -= 1;
        }

        if !self.manual_commands.is_empty() {
            self.send_queue_front(false);
            return;
        }
        if !self.job_commands.is_empty() && !self.paused {
            self.send_queue_front(true);
        }
    }

    fn send_queue_front(&mut self, from_job: bool) {
        let queue = if from_job {
            &self.job_commands
        } else {
            &self.manual_commands
        };
        let Some(line) = queue.front().cloned() else {
            return;
        };
        let mut gcode = GCode::parse(&line);
        if gcode.is_host_command() {
            self.dispatch_host_command(&gcode);
            self.pop_queue_front(from_job);
            return;
        }
        if gcode.is_empty() {
            self.pop_queue_front(from_job);
            return;
        }
        if gcode.m() != Some(117) {
            gcode.set_n(self.state.increase_last_line());
        }
        let packet = self.serialize(&gcode);
        let gcode = Arc::new(gcode);
        if self.try_send_packet(&packet, &gcode) {
            self.pop_queue_front(from_job);
            self.state.analyze(&gcode);
        } else if gcode.n().is_some() && gcode.m() != Some(110) {
            // The packet did not fit; give the line number back so the
            // sequence stays gapless.
            self.state.decrease_last_line();
        }
    }

    fn pop_queue_front(&mut self, from_job: bool) {
        if from_job {
            self.job_commands.pop_front();
        } else {
            self.manual_commands.pop_front();
        }
    }

    fn serialize(&self, gcode: &GCode) -> GCodeDataPacket {
        if !self.config.binary_protocol || gcode.force_ascii() {
            gcode.to_ascii(true, true)
        } else {
            gcode.to_binary()
        }
    }

    /// Write one framed packet if the flow regime allows it.
    fn try_send_packet(&mut self, packet: &GCodeDataPacket, gcode: &Arc<GCode>) -> bool {
        if !self.regime.can_send(packet.len()) {
            return false;
        }
        if let Err(e) = self.transport.write_bytes(packet.as_bytes()) {
            tracing::warn!(printer = %self.config.name, error = %e, "transport write failed");
            self.log
                .push(format!("Transport write failed: {e}"), logmask::ERROR);
            return false;
        }
        self.regime.note_sent(packet.len() as u16);
        self.history.push_back(Arc::clone(gcode));
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.last_command_sent_at = Instant::now();
        self.bytes_sent += packet.len() as u64;
        self.lines_sent += 1;
        self.log.push(gcode.original(), logmask::SENT);
        true
    }

    /// Handle `Resend:<n>`: rebuild the retransmission list from history,
    /// drain the firmware's UART FIFO, and start resending.
    fn handle_resend(&mut self, line: u16) {
        self.ignore_next_ok = self.config.ok_after_resend;
        self.resend_error += 1;
        self.errors_received += 1;
        if let FlowRegime::CacheWindow { size, .. } = &mut self.regime {
            // Three transmission errors on a fat window usually means the
            // firmware's buffer is smaller than configured.
            if self.errors_received == 3 && *size > 63 {
                tracing::warn!(
                    printer = %self.config.name,
                    "repeated transmission errors, shrinking receive cache to 63 bytes"
                );
                *size = 63;
            }
        }
        self.regime.resync();

        if self.resend_error > RESEND_STORM_LIMIT {
            let storm = ProtocolError::ResendStorm {
                count: self.resend_error,
            };
            tracing::error!(printer = %self.config.name, "{storm}");
            self.log.push(storm.to_string(), logmask::ERROR);
            self.transport.close();
            return;
        }

        self.resend_lines.clear();
        let mut adding = false;
        for gcode in &self.history {
            if !adding && gcode.n() == Some(line) {
                adding = true;
            }
            if adding {
                self.resend_lines.push_back(Arc::clone(gcode));
            }
        }
        if self.resend_lines.is_empty() {
            tracing::warn!(
                printer = %self.config.name,
                line,
                "resend requested for a line no longer in history"
            );
        }

        // Let the firmware's UART FIFO run dry before retransmitting,
        // otherwise the resent line lands behind leftover garbage. These
        // delays are required for correctness, not tuning.
        let baudrate = self.config.baudrate.max(1) as u64;
        if self.config.binary_protocol {
            let pause = Duration::from_millis(320_000 / baudrate);
            self.transport.sleep(pause);
            // NUL padding re-synchronizes the firmware's binary frame scanner.
            let _ = self.transport.write_bytes(&[0u8; 32]);
            self.transport.sleep(pause);
        } else {
            let cache = match &self.regime {
                FlowRegime::CacheWindow { size, .. } => *size,
                FlowRegime::PingPong { .. } => self.config.receive_cache_size,
            };
            self.transport
                .sleep(Duration::from_millis(cache as u64 * 10_000 / baudrate));
        }
        self.try_send_next();
    }

    fn dispatch_host_command(&mut self, gcode: &GCode) {
        if !self.host_commands.dispatch(gcode) {
            tracing::debug!(
                printer = %self.config.name,
                command = gcode.text().unwrap_or(""),
                "no handler registered for host command"
            );
        }
        self.log.push(gcode.original(), logmask::INFO);
    }

    /// Registry for `@` command handlers.
    pub fn host_commands_mut(&mut self) -> &mut HostCommandRegistry {
        &mut self.host_commands
    }

    /// Derived printer state.
    pub fn state(&self) -> &PrinterState {
        &self.state
    }

    /// Whether the job queue is suppressed.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the input stream boundary has been synchronized.
    pub fn is_garbage_cleared(&self) -> bool {
        self.garbage_cleared
    }

    /// Number of queued manual commands.
    pub fn queued_manual_commands(&self) -> usize {
        self.manual_commands.len()
    }

    /// Number of queued job commands.
    pub fn queued_job_commands(&self) -> usize {
        self.job_commands.len()
    }

    /// Number of commands retained for resend requests.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Commands sent since construction.
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent
    }

    /// Bytes sent since construction.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Effective firmware input buffer size. Starts at the configured value
    /// and may shrink after repeated transmission errors.
    pub fn receive_cache_size(&self) -> u16 {
        match &self.regime {
            FlowRegime::PingPong { .. } => self.config.receive_cache_size,
            FlowRegime::CacheWindow { size, .. } => *size,
        }
    }

    /// Current fill of the firmware input buffer mirror (0 in ping-pong).
    pub fn receive_cache_fill(&self) -> u16 {
        match &self.regime {
            FlowRegime::PingPong { .. } => 0,
            FlowRegime::CacheWindow { fill, .. } => *fill,
        }
    }

    /// Byte lengths of sent-but-unacknowledged packets, oldest first.
    pub fn nack_window(&self) -> Vec<u16> {
        match &self.regime {
            FlowRegime::PingPong { .. } => Vec::new(),
            FlowRegime::CacheWindow { window, .. } => window.iter().copied().collect(),
        }
    }

    /// Override the idle threshold for the `wait` resync (tests use short
    /// values instead of waiting out the 5 s default).
    pub fn set_wait_resync_after(&mut self, threshold: Duration) {
        self.wait_resync_after = threshold;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pong_regime_gates_on_ok() {
        let mut regime = FlowRegime::PingPong {
            ready_for_next_send: true,
        };
        assert!(regime.can_send(100));
        regime.note_sent(20);
        assert!(!regime.can_send(1));
        regime.note_ok();
        assert!(regime.can_send(1));
    }

    #[test]
    fn cache_window_tracks_fill() {
        let mut regime = FlowRegime::CacheWindow {
            size: 63,
            fill: 0,
            window: VecDeque::new(),
        };
        assert!(regime.can_send(63));
        assert!(!regime.can_send(64));
        regime.note_sent(40);
        assert!(regime.can_send(23));
        assert!(!regime.can_send(24));
        regime.note_ok();
        assert!(regime.can_send(63));
    }

    #[test]
    fn cache_window_ok_with_empty_window_saturates() {
        let mut regime = FlowRegime::CacheWindow {
            size: 63,
            fill: 0,
            window: VecDeque::new(),
        };
        regime.note_ok();
        assert!(regime.can_send(63));
    }

    #[test]
    fn resync_empties_the_window() {
        let mut regime = FlowRegime::CacheWindow {
            size: 63,
            fill: 0,
            window: VecDeque::new(),
        };
        regime.note_sent(40);
        regime.note_sent(10);
        regime.resync();
        assert!(regime.can_send(63));
    }

    #[test]
    fn host_command_registry_dispatches_by_name() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = HostCommandRegistry::new();
        let calls_in_handler = Arc::clone(&calls);
        registry.register(
            "pause",
            Box::new(move |_| {
                calls_in_handler.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(registry.dispatch(&GCode::parse("@pause now")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.dispatch(&GCode::parse("@resume")));
    }
}
