//! Printer facade and worker task
//!
//! One [`Printer`] per configured device. It owns the transport, the flow
//! controller (behind the send lock) and the response log, and runs one
//! background task that pumps received bytes into the flow controller and
//! drives the one-second tick.

use crate::communication::serial::SerialTransport;
use crate::communication::Transport;
use crate::firmware::reprap::{FlowController, PrinterResponse, ResponseLog};
use parking_lot::Mutex;
use printhost_settings::PrinterConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Tick cadence of the worker loop.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Idle delay between worker loop turns.
const LOOP_DELAY: Duration = Duration::from_millis(10);

/// One extruder slot in the status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ExtruderSlot {
    pub extruderid: u32,
    pub extrudernum: u32,
}

/// Point-in-time printer status for the web frontend.
///
/// Field names are the frontend's JSON ABI; do not rename.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub paused: bool,
    pub online: bool,
    #[serde(rename = "printerName")]
    pub printer_name: String,
    pub slug: String,
    pub device: String,
    pub baudrate: u32,
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub zmin: f64,
    pub zmax: f64,
    pub speedx: f64,
    pub speedy: f64,
    pub speedz: f64,
    #[serde(rename = "speedeExtrude")]
    pub speede_extrude: f64,
    #[serde(rename = "speedeRetract")]
    pub speede_retract: f64,
    #[serde(rename = "extruderCount")]
    pub extruder_count: u32,
    pub extruder: Vec<ExtruderSlot>,
}

/// A serial-attached printer and its communication engine.
pub struct Printer {
    config: Arc<PrinterConfig>,
    transport: Arc<dyn Transport>,
    flow: Arc<Mutex<FlowController>>,
    log: Arc<ResponseLog>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Printer {
    /// Create a printer speaking to the configured serial device.
    pub fn new(config: PrinterConfig, backlog_size: usize) -> Self {
        let transport: Arc<dyn Transport> =
            Arc::new(SerialTransport::new(config.device.clone(), config.baudrate));
        Self::with_transport(config, transport, backlog_size)
    }

    /// Create a printer over an arbitrary transport (tests use a mock).
    pub fn with_transport(
        config: PrinterConfig,
        transport: Arc<dyn Transport>,
        backlog_size: usize,
    ) -> Self {
        let config = Arc::new(config);
        let log = Arc::new(ResponseLog::new(backlog_size));
        let flow = Arc::new(Mutex::new(FlowController::new(
            Arc::clone(&config),
            Arc::clone(&transport),
            Arc::clone(&log),
        )));
        Self {
            config,
            transport,
            flow,
            log,
            shutdown_tx: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Printer configuration.
    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    /// Spawn the worker task. Idempotent; a running printer stays running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock() = Some(shutdown_tx);
        let flow = Arc::clone(&self.flow);
        let transport = Arc::clone(&self.transport);
        let name = self.config.name.clone();
        *task = Some(tokio::spawn(io_loop(flow, transport, shutdown_rx, name)));
    }

    /// Stop the worker task and close the transport.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.try_send(());
        }
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(printer = %self.config.name, error = %e, "worker task join failed");
            }
        }
    }

    /// Queue a single user command. Comment and blank lines are dropped
    /// here, before they reach the queues.
    pub fn inject_manual_command(&self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            return;
        }
        self.flow.lock().enqueue_manual(trimmed.to_string());
    }

    /// Queue a job command. Same filtering as manual commands.
    pub fn inject_job_command(&self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            return;
        }
        self.flow.lock().enqueue_job(trimmed.to_string());
    }

    /// Suppress or resume the job queue.
    pub fn pause(&self, paused: bool) {
        self.flow.lock().pause(paused);
    }

    /// Whether the transport is currently open.
    pub fn online(&self) -> bool {
        self.transport.is_connected()
    }

    /// Job state for the frontend. Job files live with a collaborator; from
    /// where this core stands there is never a job of its own.
    pub fn job_status(&self) -> &'static str {
        "none"
    }

    /// Responses newer than `cursor` matching `mask`, and the next cursor.
    pub fn responses_since(&self, cursor: u32, mask: u8) -> (Vec<Arc<PrinterResponse>>, u32) {
        self.log.since(cursor, mask)
    }

    /// Point-in-time status for the frontend.
    pub fn snapshot(&self) -> StatusSnapshot {
        let config = &self.config;
        StatusSnapshot {
            paused: self.flow.lock().is_paused(),
            online: self.online(),
            printer_name: config.name.clone(),
            slug: config.slug.clone(),
            device: config.device.clone(),
            baudrate: config.baudrate,
            xmin: config.xmin,
            xmax: config.xmax,
            ymin: config.ymin,
            ymax: config.ymax,
            zmin: config.zmin,
            zmax: config.zmax,
            speedx: config.speed_x,
            speedy: config.speed_y,
            speedz: config.speed_z,
            speede_extrude: config.speed_e_extrude,
            speede_retract: config.speed_e_retract,
            extruder_count: config.extruder_count,
            extruder: (0..config.extruder_count)
                .map(|i| ExtruderSlot {
                    extruderid: i,
                    extrudernum: i + 1,
                })
                .collect(),
        }
    }

    /// Snapshot rendered as a JSON value.
    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    /// The flow controller, for callers that need protocol-level access
    /// (tests, the host-command registry).
    pub fn flow(&self) -> &Mutex<FlowController> {
        &self.flow
    }
}

/// The worker loop: pump received bytes, split lines, dispatch, tick.
async fn io_loop(
    flow: Arc<Mutex<FlowController>>,
    transport: Arc<dyn Transport>,
    mut shutdown_rx: mpsc::Receiver<()>,
    name: String,
) {
    tracing::info!(printer = %name, "printer task started");
    let mut pending: Vec<u8> = Vec::new();
    // Fire the first tick immediately so the first connect attempt does not
    // wait out a full interval.
    let mut last_tick = Instant::now()
        .checked_sub(TICK_INTERVAL)
        .unwrap_or_else(Instant::now);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        if transport.is_connected() {
            let mut buf = [0u8; 256];
            loop {
                match transport.read_available(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        pending.extend_from_slice(&buf[..n]);
                        dispatch_lines(&flow, &mut pending);
                    }
                    Err(e) => {
                        tracing::warn!(printer = %name, error = %e, "transport read failed");
                        pending.clear();
                        break;
                    }
                }
            }
        }

        if last_tick.elapsed() >= TICK_INTERVAL {
            flow.lock().on_tick();
            last_tick = Instant::now();
        }

        tokio::time::sleep(LOOP_DELAY).await;
    }

    transport.close();
    tracing::info!(printer = %name, "printer task stopped");
}

/// Split complete `\n`-terminated lines off `pending` and feed them to the
/// flow controller, stripping any carriage returns.
fn dispatch_lines(flow: &Mutex<FlowController>, pending: &mut Vec<u8>) {
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let line_bytes: Vec<u8> = pending.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line_bytes);
        let line = line.trim_end_matches(['\n', '\r']);
        if !line.is_empty() {
            flow.lock().on_response(line);
        }
    }
}
