//! printhost entry point
//!
//! Loads the global configuration, loads every printer configuration from
//! the configured directory, starts a worker task per active printer, and
//! runs until interrupted.
//!
//! Exit codes: 0 clean shutdown, 1 help printed, 2 global configuration
//! missing or unreadable, 4 a printer configuration is invalid.

use clap::error::ErrorKind;
use clap::Parser;
use printhost::{init_logging, GlobalConfig, Printer, PrinterConfig};
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_CONFIG: &str = "/etc/printhost/printhost.conf";

#[derive(Parser, Debug)]
#[command(
    name = "printhost",
    version,
    about = "Host-side print server for serial-attached 3D printers"
)]
struct Cli {
    /// Path to the global configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
        Err(e) => e.exit(),
    };

    if init_logging().is_err() {
        eprintln!("failed to initialize logging");
    }
    tracing::info!(
        version = printhost::VERSION,
        built = printhost::BUILD_DATE,
        "printhost starting"
    );

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    if !config_path.exists() {
        eprintln!("Configuration file not found at {}", config_path.display());
        eprintln!("Please use --config with the correct path");
        return ExitCode::from(2);
    }
    let global = match GlobalConfig::load(&config_path) {
        Ok(global) => global,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let printer_paths = match global.printer_config_paths() {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let mut printers = Vec::new();
    for path in printer_paths {
        match PrinterConfig::load(&path) {
            Ok(config) => {
                tracing::info!(
                    printer = %config.name,
                    device = %config.device,
                    active = config.active,
                    "printer configuration loaded"
                );
                printers.push(Printer::new(config, global.backlog_size));
            }
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::from(4);
            }
        }
    }

    let active: Vec<&Printer> = printers.iter().filter(|p| p.config().active).collect();
    if active.is_empty() {
        tracing::warn!("no active printers configured");
    }
    for printer in &active {
        printer.start();
    }
    tracing::info!(count = active.len(), "printer tasks running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to wait for shutdown signal");
    }
    tracing::info!("shutting down");
    for printer in &active {
        printer.stop().await;
    }
    ExitCode::SUCCESS
}
