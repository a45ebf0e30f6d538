//! BackUP - Command-line front end for the backup pipeline.
//!
//! Runs one backup from a source directory to a destination directory,
//! printing log lines and a progress bar to stderr. Ctrl-C cancels the run.

mod logger;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use engine::{
    BackupController, ChecksumAlgorithm, JsonFilePreferences, MemoryPreferences, PipelineConfig,
    PreferencesStore, ProgressSnapshot, RunReport, RunStatus, UiSurface,
};

/// How often the main thread checks for Ctrl-C while a run is going.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// BackUP - Back up the files of one directory into another
#[derive(Parser, Debug)]
#[command(name = "backup")]
#[command(version = "0.1.0")]
#[command(about = "Copy every file of a directory into a backup directory, with progress")]
struct Args {
    /// Source directory (defaults to the one used last time)
    #[arg(long, value_name = "PATH")]
    src: Option<PathBuf>,

    /// Destination directory (defaults to the one used last time)
    #[arg(long, value_name = "PATH")]
    dst: Option<PathBuf>,

    /// Work queue capacity between scanner and copier
    #[arg(long, value_name = "N", default_value_t = 256)]
    capacity: usize,

    /// Use an unbounded work queue
    #[arg(long, conflicts_with = "capacity")]
    unbounded: bool,

    /// Progress heartbeat in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 500)]
    interval_ms: u64,

    /// Pause after each copied file, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    copy_delay_ms: u64,

    /// Pause after each queued file, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    scan_delay_ms: u64,

    /// Enable verification after copy (compares checksums)
    #[arg(long)]
    verify: bool,

    /// Checksum algorithm for verification: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "sha256", requires = "verify")]
    hash: String,

    /// Preferences file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    prefs: Option<PathBuf>,

    /// Write the run report as JSON to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// Terminal implementation of the UI surface.
///
/// Log lines and the progress bar share stderr; a log line first ends a
/// progress line that is still open.
struct CliSurface {
    bar_open: AtomicBool,
}

impl CliSurface {
    fn new() -> Self {
        CliSurface {
            bar_open: AtomicBool::new(false),
        }
    }

    fn end_progress_line(&self) {
        if self.bar_open.swap(false, Ordering::Relaxed) {
            eprintln!();
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }
}

impl UiSurface for CliSurface {
    fn append_log(&self, text: &str) {
        self.end_progress_line();
        eprintln!("[{}] {}", Local::now().format("%H:%M:%S"), text);
    }

    fn set_progress(&self, current: usize, total: usize) {
        let percent = ProgressSnapshot {
            completed: current,
            total,
        }
        .percent();
        eprint!(
            "\rProgress: {} | {}/{} files",
            Self::progress_bar(percent),
            current,
            total
        );
        let _ = std::io::stderr().flush();
        self.bar_open.store(true, Ordering::Relaxed);
    }
}

fn main() {
    let args = Args::parse();
    logger::setup_logging(args.verbose);

    let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = cancel_tx.try_send(());
    }) {
        log::warn!("Ctrl-C handler not installed: {}", e);
    }

    let exit_code = match run_cli(&args, &cancel_rx) {
        Ok(report) => exit_code_for(report.status),
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

fn exit_code_for(status: RunStatus) -> i32 {
    match status {
        RunStatus::Completed => 0,
        RunStatus::CompletedWithErrors { .. } => 1,
        RunStatus::Cancelled => 130,
    }
}

fn pipeline_config(args: &Args) -> Result<PipelineConfig, String> {
    let verify = if args.verify {
        Some(args.hash.parse::<ChecksumAlgorithm>()?)
    } else {
        None
    };

    Ok(PipelineConfig {
        channel_capacity: if args.unbounded {
            None
        } else {
            Some(args.capacity)
        },
        monitor_interval: Duration::from_millis(args.interval_ms),
        scan_delay: Duration::from_millis(args.scan_delay_ms),
        copy_delay: Duration::from_millis(args.copy_delay_ms),
        verify,
        ..PipelineConfig::default()
    })
}

fn preferences_store(args: &Args) -> Arc<dyn PreferencesStore> {
    match args.prefs.clone().or_else(JsonFilePreferences::default_location) {
        Some(path) => {
            log::debug!("preferences file: {}", path.display());
            Arc::new(JsonFilePreferences::new(path))
        }
        None => {
            log::warn!("No config directory found; paths will not be remembered");
            Arc::new(MemoryPreferences::new())
        }
    }
}

/// Main CLI logic - separated for testability
///
/// Cancels the run when `cancel_rx` receives; a disconnected receiver
/// means nobody can cancel, so the run is simply waited for.
fn run_cli(args: &Args, cancel_rx: &Receiver<()>) -> Result<RunReport, String> {
    let config = pipeline_config(args)?;
    let ui = Arc::new(CliSurface::new());
    let controller = BackupController::new(ui.clone(), preferences_store(args), config);

    let saved = controller.restore_paths();
    let source = args
        .src
        .clone()
        .or_else(|| saved.source.map(PathBuf::from))
        .ok_or("No source directory given and none remembered (use --src)")?;
    let destination = args
        .dst
        .clone()
        .or_else(|| saved.destination.map(PathBuf::from))
        .ok_or("No destination directory given and none remembered (use --dst)")?;

    eprintln!("Preparing backup...");
    eprintln!("  Source: {}", source.display());
    eprintln!("  Destination: {}", destination.display());
    match controller.config().channel_capacity {
        Some(capacity) => eprintln!("  Queue: {} items", capacity),
        None => eprintln!("  Queue: unbounded"),
    }
    eprintln!();

    let start_time = Instant::now();
    let mut run = controller
        .start(&source, &destination)
        .map_err(|e| format!("Backup could not start: {}", e))?;
    log::debug!("run id {}", run.id());

    let report = loop {
        if run.is_finished() {
            break controller.wait(&mut run);
        }
        match cancel_rx.recv_timeout(CANCEL_POLL) {
            Ok(()) => break controller.cancel(&mut run),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break controller.wait(&mut run),
        }
    };
    ui.end_progress_line();

    eprintln!();
    eprintln!(
        "Summary: {} copied, {} failed, {} not copied",
        report.completed,
        report.failures.len(),
        report.abandoned
    );
    eprintln!("Bytes copied: {}", CliSurface::format_bytes(report.bytes_copied));
    eprintln!("Elapsed: {}", CliSurface::format_duration(start_time.elapsed()));

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }

    Ok(report)
}

fn write_report(path: &Path, report: &RunReport) -> Result<(), String> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| format!("Failed to encode run report: {}", e))?;
    fs::write(path, json)
        .map_err(|e| format!("Failed to write run report to {}: {}", path.display(), e))
}
