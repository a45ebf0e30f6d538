//! Run orchestration.
//!
//! The controller validates input, remembers the chosen paths, builds a
//! fresh channel/token/progress triple per run and starts the three stage
//! threads. The returned [`RunHandle`] is the only place the stop flag is
//! set from.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::channel::WorkChannel;
use crate::copier::{self, CopyOptions, CopyOutcome};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{
    FileFailure, PipelineConfig, RunReport, RunStatus, Stage, StageReport, StageState,
};
use crate::monitor::{self, MonitorOutcome};
use crate::prefs::{PreferencesStore, DESTINATION_KEY, SOURCE_KEY};
use crate::progress::{ProgressSnapshot, ProgressState};
use crate::scanner::{self, ScanOptions, ScanOutcome};
use crate::surface::UiSurface;

/// Paths remembered from the previous run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedPaths {
    pub source: Option<String>,
    pub destination: Option<String>,
}

/// Starts backup runs, one at a time.
pub struct BackupController {
    ui: Arc<dyn UiSurface>,
    prefs: Arc<dyn PreferencesStore>,
    config: PipelineConfig,
    active: Arc<AtomicBool>,
}

impl BackupController {
    pub fn new(
        ui: Arc<dyn UiSurface>,
        prefs: Arc<dyn PreferencesStore>,
        config: PipelineConfig,
    ) -> Self {
        BackupController {
            ui,
            prefs,
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// True while a run started here has not been joined.
    pub fn has_active_run(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Load the last source and destination; failures are logged and read
    /// as absent.
    pub fn restore_paths(&self) -> SavedPaths {
        SavedPaths {
            source: self.load_pref(SOURCE_KEY),
            destination: self.load_pref(DESTINATION_KEY),
        }
    }

    fn load_pref(&self, key: &str) -> Option<String> {
        match self.prefs.load(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{}", e);
                self.ui
                    .append_log(&format!("Failed to load previous preferences: {}", e));
                None
            }
        }
    }

    fn save_paths(&self, source: &Path, destination: &Path) {
        let pairs = [
            (SOURCE_KEY, source.to_string_lossy()),
            (DESTINATION_KEY, destination.to_string_lossy()),
        ];
        for (key, value) in pairs {
            if let Err(e) = self.prefs.save(key, &value) {
                log::warn!("{}", e);
                self.ui
                    .append_log(&format!("Error saving preferences: {}", e));
            }
        }
    }

    /// Validate input and start the scanner, copier and monitor.
    ///
    /// # Errors
    /// - `InvalidInput` if the source is not a listable directory, the
    ///   destination is empty or is the source itself, or the config is
    ///   invalid
    /// - `RunAlreadyActive` if a previous run has not been joined
    /// - `StageSpawn` if a stage thread cannot be started
    pub fn start<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        source: P,
        destination: Q,
    ) -> Result<RunHandle, EngineError> {
        let source = source.as_ref();
        let destination = destination.as_ref();
        validate_paths(source, destination)?;
        self.config.validate()?;
        let total = count_source(source)?;

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::RunAlreadyActive);
        }
        let active = ActiveGuard(Arc::clone(&self.active));

        self.save_paths(source, destination);

        let shared = Arc::new(RunShared {
            channel: WorkChannel::new(self.config.channel_capacity),
            token: CancellationToken::new(),
            progress: ProgressState::new(),
        });
        shared.progress.record_discovered(total);

        let id = Uuid::new_v4();
        log::info!(
            "run {} starting: {} file(s) from {} to {}",
            id,
            total,
            source.display(),
            destination.display()
        );
        self.ui.append_log("Starting backup...");
        self.ui.set_progress(0, total);

        let mut handle = RunHandle {
            id,
            shared,
            ui: Arc::clone(&self.ui),
            scanner: None,
            copier: None,
            monitor: None,
            started_at: Utc::now(),
            report: None,
            active: Some(active),
        };

        // On a spawn failure, dropping `handle` stops and joins whatever did start.
        handle.scanner = Some(spawn_scanner(
            source.to_path_buf(),
            Arc::clone(&handle.shared),
            ScanOptions {
                poll_interval: self.config.poll_interval,
                scan_delay: self.config.scan_delay,
            },
        )?);
        handle.copier = Some(spawn_copier(
            destination.to_path_buf(),
            Arc::clone(&handle.shared),
            CopyOptions {
                poll_interval: self.config.poll_interval,
                copy_delay: self.config.copy_delay,
                verify: self.config.verify,
            },
        )?);
        handle.monitor = Some(spawn_monitor(
            Arc::clone(&handle.shared),
            Arc::clone(&self.ui),
            self.config.monitor_interval,
        )?);

        Ok(handle)
    }

    /// Stop the run and wait for all three stages.
    ///
    /// Safe to call on a run that already finished, and more than once; later
    /// calls return the first report.
    pub fn cancel(&self, handle: &mut RunHandle) -> RunReport {
        handle.cancel()
    }

    /// Wait for the run to finish on its own.
    pub fn wait(&self, handle: &mut RunHandle) -> RunReport {
        handle.wait()
    }
}

fn validate_paths(source: &Path, destination: &Path) -> Result<(), EngineError> {
    match std::fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::invalid_input(source, "source must be a directory"));
        }
        Err(e) => {
            return Err(EngineError::invalid_input(
                source,
                format!("source directory is not accessible: {}", e),
            ));
        }
    }

    if destination.as_os_str().is_empty() {
        return Err(EngineError::invalid_input(destination, "destination path is empty"));
    }
    if fs_ops::is_same_file(source, destination) {
        return Err(EngineError::invalid_input(
            destination,
            "destination is the source directory",
        ));
    }
    Ok(())
}

/// Initial file count; an unlistable source is bad input, not a file error.
fn count_source(source: &Path) -> Result<usize, EngineError> {
    fs_ops::count_files(source).map_err(|e| {
        EngineError::invalid_input(source, format!("source directory cannot be listed: {}", e))
    })
}

/// Clears the controller's active flag when the run is released.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct RunShared {
    channel: WorkChannel,
    token: CancellationToken,
    progress: ProgressState,
}

fn spawn_stage<T, F>(stage: Stage, body: F) -> Result<JoinHandle<T>, EngineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(stage.name().to_string())
        .spawn(body)
        .map_err(|source| EngineError::StageSpawn {
            stage: stage.name(),
            source,
        })
}

fn spawn_scanner(
    source: PathBuf,
    shared: Arc<RunShared>,
    options: ScanOptions,
) -> Result<JoinHandle<ScanOutcome>, EngineError> {
    spawn_stage(Stage::Scanner, move || {
        scanner::run_scanner(
            &source,
            &shared.channel,
            &shared.token,
            &shared.progress,
            options,
        )
    })
}

fn spawn_copier(
    destination: PathBuf,
    shared: Arc<RunShared>,
    options: CopyOptions,
) -> Result<JoinHandle<CopyOutcome>, EngineError> {
    spawn_stage(Stage::Copier, move || {
        copier::run_copier(
            &destination,
            &shared.channel,
            &shared.token,
            &shared.progress,
            options,
        )
    })
}

fn spawn_monitor(
    shared: Arc<RunShared>,
    ui: Arc<dyn UiSurface>,
    interval: std::time::Duration,
) -> Result<JoinHandle<MonitorOutcome>, EngineError> {
    spawn_stage(Stage::Monitor, move || {
        monitor::run_monitor(&shared.token, &shared.progress, ui.as_ref(), interval)
    })
}

/// Join a stage thread, mapping a panic to `StageState::Panicked`.
fn join_stage<T>(
    stage: Stage,
    handle: Option<JoinHandle<T>>,
    state_of: impl Fn(&T) -> StageState,
) -> (Option<T>, StageReport) {
    let Some(handle) = handle else {
        return (
            None,
            StageReport {
                stage,
                state: StageState::Stopped,
            },
        );
    };
    match handle.join() {
        Ok(outcome) => {
            let state = state_of(&outcome);
            (Some(outcome), StageReport { stage, state })
        }
        Err(_) => {
            log::error!("{} thread panicked", stage);
            (
                None,
                StageReport {
                    stage,
                    state: StageState::Panicked,
                },
            )
        }
    }
}

/// One active backup run.
///
/// Dropping a handle that was never joined cancels the run and joins it.
pub struct RunHandle {
    id: Uuid,
    shared: Arc<RunShared>,
    ui: Arc<dyn UiSurface>,
    scanner: Option<JoinHandle<ScanOutcome>>,
    copier: Option<JoinHandle<CopyOutcome>>,
    monitor: Option<JoinHandle<MonitorOutcome>>,
    started_at: DateTime<Utc>,
    report: Option<RunReport>,
    active: Option<ActiveGuard>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.shared.progress.snapshot()
    }

    /// True once the copier has stopped, so joining will not block on work.
    pub fn is_finished(&self) -> bool {
        self.report.is_some()
            || self
                .copier
                .as_ref()
                .map_or(true, |copier| copier.is_finished())
    }

    /// The report, once the run has been joined.
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    pub fn cancel(&mut self) -> RunReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        self.shared.token.request_stop();
        self.shared.progress.wake_all();
        self.ui.append_log("Cancellation requested.");
        self.finish()
    }

    pub fn wait(&mut self) -> RunReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        self.finish()
    }

    fn finish(&mut self) -> RunReport {
        // The copier only drains after the scanner closes the channel, so join
        // it first. Once nothing consumes, a scanner blocked on a full queue
        // and the monitor both need the stop flag to exit.
        let (copy, copier_report) =
            join_stage(Stage::Copier, self.copier.take(), CopyOutcome::state);
        self.shared.token.request_stop();
        self.shared.progress.wake_all();
        let (scan, scanner_report) =
            join_stage(Stage::Scanner, self.scanner.take(), ScanOutcome::state);
        let (_, monitor_report) =
            join_stage(Stage::Monitor, self.monitor.take(), MonitorOutcome::state);

        let snapshot = self.shared.progress.snapshot();
        self.ui.set_progress(snapshot.completed, snapshot.total);

        let failures: Vec<FileFailure> = copy
            .as_ref()
            .map(|c| c.failures.clone())
            .unwrap_or_default();
        let abandoned = copy.as_ref().map_or(0, |c| c.abandoned);
        let bytes_copied = copy.as_ref().map_or(0, |c| c.bytes_copied);
        let listing_errors = scan
            .as_ref()
            .map_or(0, |s| usize::from(s.listing_error.is_some()));

        let stages = vec![scanner_report, copier_report, monitor_report];
        let cancelled = [scanner_report, copier_report]
            .iter()
            .any(|r| r.state == StageState::Stopped);
        let panicked = stages.iter().filter(|r| r.state == StageState::Panicked).count();
        let errors = failures.len() + listing_errors + panicked;

        let status = if cancelled {
            RunStatus::Cancelled
        } else if errors > 0 {
            RunStatus::CompletedWithErrors { errors }
        } else {
            RunStatus::Completed
        };

        for failure in &failures {
            self.ui.append_log(&format!(
                "Error copying file {}: {}",
                failure.path.display(),
                failure.message
            ));
        }
        if let Some(msg) = scan.as_ref().and_then(|s| s.listing_error.as_ref()) {
            self.ui.append_log(&format!("Error during file scan: {}", msg));
        }
        for stage in &stages {
            self.ui
                .append_log(&format!("{} state: {}", stage.stage, stage.state));
        }
        self.ui.append_log(&format!(
            "Backup {}: {}/{} files copied",
            status, snapshot.completed, snapshot.total
        ));
        log::info!("run {} {}", self.id, status);

        let report = RunReport {
            run_id: self.id,
            status,
            discovered: snapshot.total,
            completed: snapshot.completed,
            bytes_copied,
            failures,
            abandoned,
            stages,
            started_at: self.started_at,
            finished_at: Utc::now(),
        };
        self.report = Some(report.clone());
        self.active.take();
        report
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if self.report.is_some() {
            return;
        }
        self.shared.token.request_stop();
        self.shared.progress.wake_all();

        // The copier is only spawned after the scanner, so the scanner is
        // always there to close the channel.
        let panicked = [
            self.scanner.take().map(|h| h.join().is_err()),
            self.copier.take().map(|h| h.join().is_err()),
            self.monitor.take().map(|h| h.join().is_err()),
        ]
        .into_iter()
        .flatten()
        .filter(|&p| p)
        .count();
        if panicked > 0 {
            log::error!("{} stage thread(s) panicked during shutdown of run {}", panicked, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;
    use crate::surface::testing::RecordingSurface;
    use std::fs;
    use std::time::{Duration, Instant};

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            monitor_interval: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
            ..PipelineConfig::default()
        }
    }

    fn controller_with(config: PipelineConfig) -> (BackupController, Arc<RecordingSurface>, Arc<MemoryPreferences>) {
        let ui = Arc::new(RecordingSurface::new());
        let prefs = Arc::new(MemoryPreferences::new());
        let controller = BackupController::new(ui.clone(), prefs.clone(), config);
        (controller, ui, prefs)
    }

    fn populate(dir: &Path, count: usize) {
        fs::create_dir_all(dir).expect("Failed to create dir");
        for i in 0..count {
            fs::write(dir.join(format!("file{}.txt", i)), format!("payload {}", i))
                .expect("Failed to write file");
        }
    }

    #[test]
    fn test_five_files_complete() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        populate(&src, 5);

        let (controller, ui, _) = controller_with(fast_config());
        let mut run = controller.start(&src, &dst).expect("Failed to start");
        let report = controller.wait(&mut run);

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.discovered, 5);
        assert_eq!(report.completed, 5);
        assert!(report.failures.is_empty());
        for i in 0..5 {
            let name = format!("file{}.txt", i);
            assert_eq!(
                fs::read_to_string(dst.join(&name)).expect("missing copy"),
                format!("payload {}", i)
            );
        }
        assert_eq!(ui.progress().last(), Some(&(5, 5)));
        assert!(ui.has_log("Starting backup..."));
        assert!(!controller.has_active_run());

        assert_eq!(run.report().map(|r| r.run_id), Some(run.id()));

        let json = serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(json["status"], "completed");
        let stages: Vec<_> = json["stages"]
            .as_array()
            .expect("stages should be an array")
            .iter()
            .map(|s| (s["stage"].as_str(), s["state"].as_str()))
            .collect();
        assert_eq!(
            stages,
            vec![
                (Some("scanner"), Some("finished")),
                (Some("copier"), Some("finished")),
                (Some("monitor"), Some("stopped")),
            ]
        );
    }

    #[test]
    fn test_mixed_run_accounts_for_every_source_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        populate(&src, 4);
        // A directory squatting on one target name makes that copy fail.
        fs::create_dir_all(dst.join("file2.txt")).expect("Failed to create blocker dir");

        let (controller, _, _) = controller_with(fast_config());
        let mut run = controller.start(&src, &dst).expect("Failed to start");
        let report = controller.wait(&mut run);

        assert_eq!(report.status, RunStatus::CompletedWithErrors { errors: 1 });
        assert_eq!(report.completed, 3);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error_code.is_some());

        for source in fs_ops::list_files(&src).expect("Failed to list source") {
            let name = source.file_name().expect("file name");
            let copied = fs::read_to_string(dst.join(name))
                .map(|content| content == fs::read_to_string(&source).expect("read source"))
                .unwrap_or(false);
            let failed = report.failures.iter().any(|f| f.path == source);
            assert!(
                copied != failed,
                "{} must be either copied or recorded as failed",
                source.display()
            );
        }
    }

    #[test]
    fn test_progress_reports_are_monotonic() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        populate(&src, 20);

        let config = PipelineConfig {
            copy_delay: Duration::from_millis(5),
            ..fast_config()
        };
        let (controller, ui, _) = controller_with(config);
        let mut run = controller
            .start(&src, temp_dir.path().join("dst"))
            .expect("Failed to start");
        controller.wait(&mut run);

        let reports = ui.progress();
        assert!(reports.len() > 2);
        assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(reports.iter().all(|&(done, total)| done <= total));
    }

    #[test]
    fn test_cancel_after_two_of_five() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        populate(&src, 5);

        let config = PipelineConfig {
            copy_delay: Duration::from_millis(300),
            ..fast_config()
        };
        let (controller, ui, _) = controller_with(config);
        let mut run = controller.start(&src, &dst).expect("Failed to start");

        let deadline = Instant::now() + Duration::from_secs(10);
        while run.progress().completed < 2 {
            assert!(Instant::now() < deadline, "copier never reached 2 files");
            std::thread::sleep(Duration::from_millis(5));
        }
        let report = controller.cancel(&mut run);

        assert_eq!(report.status, RunStatus::Cancelled);
        assert!(
            report.completed == 2 || report.completed == 3,
            "completed = {}",
            report.completed
        );
        assert_eq!(report.stage_state(Stage::Copier), Some(StageState::Stopped));
        let copied = fs::read_dir(&dst).expect("dst missing").count();
        assert_eq!(copied, report.completed);
        assert!(ui.has_log("Cancellation requested."));
        assert!(ui.has_log("copier state: Stopped"));
    }

    #[test]
    fn test_unwritable_destination_completes_with_errors() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        populate(&src, 3);
        let dst = temp_dir.path().join("occupied");
        fs::write(&dst, b"a file, not a directory").expect("Failed to write blocker");

        let (controller, ui, _) = controller_with(fast_config());
        let mut run = controller.start(&src, &dst).expect("Failed to start");
        let report = controller.wait(&mut run);

        assert_eq!(report.status, RunStatus::CompletedWithErrors { errors: 3 });
        assert_eq!(report.completed, 0);
        assert_eq!(report.failures.len(), 3);
        assert!(ui.has_log("Error copying file"));
    }

    #[test]
    fn test_cancel_on_finished_run_is_immediate_and_idempotent() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        populate(&src, 2);

        let (controller, _, _) = controller_with(fast_config());
        let mut run = controller
            .start(&src, temp_dir.path().join("dst"))
            .expect("Failed to start");
        let first = controller.wait(&mut run);

        let started = Instant::now();
        let second = controller.cancel(&mut run);
        let third = controller.cancel(&mut run);
        assert!(started.elapsed() < Duration::from_millis(500));

        assert_eq!(first.status, RunStatus::Completed);
        assert_eq!(second.status, RunStatus::Completed);
        assert_eq!(third.run_id, first.run_id);
    }

    #[test]
    fn test_cancel_after_natural_finish_reports_completed() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        populate(&src, 3);

        let (controller, _, _) = controller_with(fast_config());
        let mut run = controller
            .start(&src, temp_dir.path().join("dst"))
            .expect("Failed to start");

        let deadline = Instant::now() + Duration::from_secs(10);
        while !run.is_finished() {
            assert!(Instant::now() < deadline, "run never finished");
            std::thread::sleep(Duration::from_millis(5));
        }
        let report = controller.cancel(&mut run);
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.completed, 3);
    }

    #[test]
    fn test_second_start_rejected_while_active() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        populate(&src, 3);

        let config = PipelineConfig {
            copy_delay: Duration::from_millis(100),
            ..fast_config()
        };
        let (controller, _, _) = controller_with(config);
        let mut run = controller
            .start(&src, temp_dir.path().join("dst"))
            .expect("Failed to start");

        let second = controller.start(&src, temp_dir.path().join("dst2"));
        assert!(matches!(second, Err(EngineError::RunAlreadyActive)));

        controller.cancel(&mut run);
        let mut again = controller
            .start(&src, temp_dir.path().join("dst3"))
            .expect("start after join should succeed");
        controller.wait(&mut again);
    }

    #[test]
    fn test_dropping_handle_releases_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        populate(&src, 3);

        let config = PipelineConfig {
            copy_delay: Duration::from_millis(100),
            ..fast_config()
        };
        let (controller, _, _) = controller_with(config);
        let run = controller
            .start(&src, temp_dir.path().join("dst"))
            .expect("Failed to start");
        assert!(controller.has_active_run());
        drop(run);
        assert!(!controller.has_active_run());
    }

    #[test]
    fn test_missing_source_rejected_before_start() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (controller, ui, prefs) = controller_with(fast_config());

        let result = controller.start(temp_dir.path().join("nonexistent"), temp_dir.path());
        assert!(matches!(result, Err(EngineError::InvalidInput { .. })));
        assert!(!controller.has_active_run());
        assert!(ui.logs().is_empty());
        assert_eq!(prefs.load(SOURCE_KEY).expect("load failed"), None);
    }

    #[test]
    fn test_destination_equal_to_source_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(&src).expect("Failed to create dir");
        fs::write(src.join("precious.txt"), "irreplaceable data").expect("Failed to write file");

        let (controller, _, prefs) = controller_with(fast_config());
        for destination in [src.clone(), src.join("."), src.join("..").join("src")] {
            let result = controller.start(&src, &destination);
            assert!(
                matches!(result, Err(EngineError::InvalidInput { .. })),
                "{} should be rejected",
                destination.display()
            );
        }

        assert!(!controller.has_active_run());
        assert_eq!(prefs.load(DESTINATION_KEY).expect("load failed"), None);
        assert_eq!(
            fs::read_to_string(src.join("precious.txt")).expect("Failed to read file"),
            "irreplaceable data"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unlistable_source_is_invalid_input_and_not_saved() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("locked");
        populate(&src, 1);
        fs::set_permissions(&src, fs::Permissions::from_mode(0o000)).expect("chmod failed");

        // Permission bits are not enforced for root; nothing to check then.
        if fs::read_dir(&src).is_ok() {
            fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).expect("chmod failed");
            return;
        }

        let (controller, _, prefs) = controller_with(fast_config());
        let result = controller.start(&src, temp_dir.path().join("dst"));
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).expect("chmod failed");

        assert!(matches!(result, Err(EngineError::InvalidInput { .. })));
        assert!(!controller.has_active_run());
        assert_eq!(prefs.load(SOURCE_KEY).expect("load failed"), None);
    }

    #[test]
    fn test_empty_destination_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (controller, _, _) = controller_with(fast_config());

        let result = controller.start(temp_dir.path(), "");
        assert!(matches!(result, Err(EngineError::InvalidInput { .. })));
    }

    #[test]
    fn test_paths_saved_and_restored() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        populate(&src, 1);

        let (controller, _, _) = controller_with(fast_config());
        assert_eq!(controller.restore_paths(), SavedPaths::default());

        let mut run = controller.start(&src, &dst).expect("Failed to start");
        controller.wait(&mut run);

        let saved = controller.restore_paths();
        assert_eq!(saved.source.as_deref(), Some(src.to_string_lossy().as_ref()));
        assert_eq!(saved.destination.as_deref(), Some(dst.to_string_lossy().as_ref()));
    }

    struct FailingPrefs;

    impl PreferencesStore for FailingPrefs {
        fn load(&self, key: &str) -> Result<Option<String>, EngineError> {
            Err(EngineError::Persistence {
                key: key.to_string(),
                reason: "store offline".to_string(),
            })
        }

        fn save(&self, key: &str, _value: &str) -> Result<(), EngineError> {
            self.load(key).map(|_| ())
        }
    }

    #[test]
    fn test_persistence_failures_are_not_fatal() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        populate(&src, 2);

        let ui = Arc::new(RecordingSurface::new());
        let controller = BackupController::new(ui.clone(), Arc::new(FailingPrefs), fast_config());

        assert_eq!(controller.restore_paths(), SavedPaths::default());
        let mut run = controller
            .start(&src, temp_dir.path().join("dst"))
            .expect("Failed to start");
        let report = controller.wait(&mut run);

        assert_eq!(report.status, RunStatus::Completed);
        assert!(ui.has_log("Failed to load previous preferences"));
        assert!(ui.has_log("Error saving preferences"));
    }

    #[test]
    fn test_bounded_channel_of_one_still_completes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        populate(&src, 12);

        let config = PipelineConfig {
            channel_capacity: Some(1),
            ..fast_config()
        };
        let (controller, _, _) = controller_with(config);
        assert_eq!(controller.config().channel_capacity, Some(1));
        let mut run = controller
            .start(&src, temp_dir.path().join("dst"))
            .expect("Failed to start");
        let report = controller.wait(&mut run);

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.completed, 12);
    }

    #[test]
    fn test_empty_source_completes_immediately() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");

        let (controller, _, _) = controller_with(fast_config());
        let mut run = controller
            .start(&src, temp_dir.path().join("dst"))
            .expect("Failed to start");
        let report = controller.wait(&mut run);

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.discovered, 0);
        assert_eq!(report.completed, 0);
    }
}
