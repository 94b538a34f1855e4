// --- Upload batches ------------------------------------------------------
//
// Two ways to push a batch of files to the device:
//
//   concurrent  - every upload starts at once, each with its own byte-level
//                 progress bar. Failures are annotated per file and do not stop
//                 the others. When the last one finishes (whatever its outcome)
//                 the completion barrier fires and the caller refreshes the
//                 file list exactly once.
//   sequential  - one file at a time in the order given, with an overall
//                 percentage and a time-remaining estimate. The first failure
//                 stops the queue.
//
// Progress is published on an `UploadBoard`. A new batch replaces the board's
// contents; writes tagged with an older batch id are dropped, so a straggling
// callback from a previous batch can't scribble on the current one.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::device::{DeviceApi, ProgressFn, UploadFile};

pub const SUCCESS_MARKER: &str = "✓ uploaded";
pub const FAILURE_MARKER: &str = "✗ failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    #[default]
    Concurrent,
    Sequential,
}

impl std::str::FromStr for UploadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "concurrent" => Ok(UploadMode::Concurrent),
            "sequential" => Ok(UploadMode::Sequential),
            other => Err(format!("unknown upload mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadOutcome {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadTask {
    pub name: String,
    pub label: String,
    pub progress_percent: f32,
    pub outcome: UploadOutcome,
}

impl UploadTask {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: format!("⬆ {name}"),
            progress_percent: 0.0,
            outcome: UploadOutcome::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadBatch {
    pub id: Uuid,
    pub mode: UploadMode,
    pub tasks: Vec<UploadTask>,
    pub finished: usize,
    /// Sequential mode: share of files done, 0..=100.
    pub overall_percent: u8,
    /// Sequential mode: estimated time remaining as `m:ss`.
    pub eta: Option<String>,
    /// Sequential mode: why the queue stopped early.
    pub error: Option<String>,
    pub done: bool,
}

/// Counts finished operations and fires exactly once, when the last of
/// `total` arrives.
#[derive(Debug, Clone)]
pub struct CompletionBarrier {
    total: usize,
    arrived: usize,
}

impl CompletionBarrier {
    pub fn new(total: usize) -> Self {
        Self { total, arrived: 0 }
    }

    /// Returns true for the arrival that completes the set and never again.
    pub fn arrive(&mut self) -> bool {
        self.arrived += 1;
        self.arrived == self.total
    }

    pub fn arrived(&self) -> usize {
        self.arrived
    }
}

/// What a finished batch asks of its caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    /// The file list should be fetched again.
    pub refresh: bool,
    /// Sequential mode stopped at this file.
    pub aborted_at: Option<String>,
}

#[derive(Clone, Default)]
pub struct UploadBoard {
    inner: Arc<Mutex<Option<UploadBatch>>>,
}

impl UploadBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<UploadBatch>> {
        // A panic while holding this lock can only leave a half-updated progress
        // display behind; keep serving it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clear the board and start a fresh batch for `names`.
    pub fn start(&self, mode: UploadMode, names: &[String]) -> Uuid {
        let id = Uuid::new_v4();
        *self.lock() = Some(UploadBatch {
            id,
            mode,
            tasks: names.iter().map(|n| UploadTask::new(n)).collect(),
            finished: 0,
            overall_percent: 0,
            eta: None,
            error: None,
            done: false,
        });
        id
    }

    pub fn snapshot(&self) -> Option<UploadBatch> {
        self.lock().clone()
    }

    fn with_batch(&self, id: Uuid, f: impl FnOnce(&mut UploadBatch)) {
        let mut guard = self.lock();
        if let Some(batch) = guard.as_mut().filter(|b| b.id == id) {
            f(batch);
        }
    }

    fn set_progress(&self, id: Uuid, index: usize, percent: f32) {
        self.with_batch(id, |b| {
            if let Some(task) = b.tasks.get_mut(index) {
                task.progress_percent = percent.clamp(0.0, 100.0);
            }
        });
    }

    fn finish_task(&self, id: Uuid, index: usize, ok: bool) {
        self.with_batch(id, |b| {
            if let Some(task) = b.tasks.get_mut(index) {
                if ok {
                    task.outcome = UploadOutcome::Succeeded;
                    task.progress_percent = 100.0;
                    task.label = format!("{} {SUCCESS_MARKER}", task.label);
                } else {
                    task.outcome = UploadOutcome::Failed;
                    task.label = format!("{} {FAILURE_MARKER}", task.label);
                }
            }
            b.finished += 1;
        });
    }

    fn set_overall(&self, id: Uuid, percent: u8, eta: Option<String>) {
        self.with_batch(id, |b| {
            b.overall_percent = percent;
            b.eta = eta;
        });
    }

    fn abort(&self, id: Uuid, error: String) {
        self.with_batch(id, |b| {
            b.error = Some(error);
            b.done = true;
        });
    }

    fn complete(&self, id: Uuid) {
        self.with_batch(id, |b| b.done = true);
    }
}

pub fn byte_percent(sent: u64, total: u64) -> f32 {
    if total == 0 {
        return 100.0;
    }
    (sent as f64 / total as f64 * 100.0) as f32
}

/// `elapsed / completed * remaining`.
pub fn estimate_remaining(elapsed: Duration, completed: usize, total: usize) -> Duration {
    if completed == 0 {
        return Duration::ZERO;
    }
    let remaining = total.saturating_sub(completed) as f64;
    Duration::from_secs_f64(elapsed.as_secs_f64() / completed as f64 * remaining)
}

pub fn fmt_dur_mmss(d: Duration) -> String {
    let total_s = d.as_secs();
    let m = total_s / 60;
    let s = total_s % 60;
    format!("{}:{:02}", m, s)
}

fn progress_reporter(board: &UploadBoard, id: Uuid, index: usize) -> ProgressFn {
    let board = board.clone();
    Arc::new(move |sent, total| board.set_progress(id, index, byte_percent(sent, total)))
}

/// Run one batch to the end. The caller owns the refresh that `BatchReport`
/// asks for.
pub async fn run_batch<D: DeviceApi>(
    device: &D,
    board: &UploadBoard,
    batch: Uuid,
    mode: UploadMode,
    files: Vec<UploadFile>,
) -> BatchReport {
    match mode {
        UploadMode::Concurrent => upload_concurrent(device, board, batch, files).await,
        UploadMode::Sequential => upload_sequential(device, board, batch, files).await,
    }
}

async fn upload_concurrent<D: DeviceApi>(
    device: &D,
    board: &UploadBoard,
    batch: Uuid,
    files: Vec<UploadFile>,
) -> BatchReport {
    let mut report = BatchReport::default();
    if files.is_empty() {
        board.complete(batch);
        return report;
    }

    let mut barrier = CompletionBarrier::new(files.len());
    let mut in_flight: FuturesUnordered<_> = files
        .into_iter()
        .enumerate()
        .map(|(index, file)| {
            let progress = progress_reporter(board, batch, index);
            async move {
                let name = file.name.clone();
                (index, name, device.upload(file, progress).await)
            }
        })
        .collect();

    while let Some((index, name, result)) = in_flight.next().await {
        match result {
            Ok(()) => {
                info!("upload {name}: ok");
                report.succeeded += 1;
                board.finish_task(batch, index, true);
            }
            Err(e) => {
                warn!("upload {name} failed: {e}");
                report.failed += 1;
                board.finish_task(batch, index, false);
            }
        }
        if barrier.arrive() {
            report.refresh = true;
        }
    }

    board.complete(batch);
    report
}

async fn upload_sequential<D: DeviceApi>(
    device: &D,
    board: &UploadBoard,
    batch: Uuid,
    files: Vec<UploadFile>,
) -> BatchReport {
    let mut report = BatchReport::default();
    let total = files.len();
    if total == 0 {
        board.complete(batch);
        return report;
    }

    let started = Instant::now();
    for (index, file) in files.into_iter().enumerate() {
        let name = file.name.clone();
        let progress = progress_reporter(board, batch, index);
        if let Err(e) = device.upload(file, progress).await {
            warn!("upload {name} failed, stopping the remaining {} file(s): {e}", total - index - 1);
            report.failed += 1;
            report.aborted_at = Some(name.clone());
            board.finish_task(batch, index, false);
            board.abort(batch, format!("Upload of {name} failed: {e}"));
            return report;
        }

        report.succeeded += 1;
        board.finish_task(batch, index, true);

        let done = report.succeeded;
        let percent = ((done as f64 / total as f64) * 100.0).round() as u8;
        let eta = estimate_remaining(started.elapsed(), done, total);
        board.set_overall(batch, percent, Some(fmt_dur_mmss(eta)));
        info!("upload {name}: ok ({done}/{total})");
    }

    report.refresh = true;
    board.complete(batch);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;

    fn files(names: &[&str]) -> Vec<UploadFile> {
        names
            .iter()
            .map(|n| UploadFile::new(*n, vec![b'7'; 10_000]))
            .collect()
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn barrier_fires_once() {
        let mut b = CompletionBarrier::new(3);
        assert!(!b.arrive());
        assert!(!b.arrive());
        assert!(b.arrive());
        assert!(!b.arrive());
        assert_eq!(b.arrived(), 4);
    }

    #[test]
    fn eta_formula_and_format() {
        let eta = estimate_remaining(Duration::from_secs(30), 2, 5);
        assert_eq!(eta, Duration::from_secs(45));
        assert_eq!(fmt_dur_mmss(eta), "0:45");
        assert_eq!(fmt_dur_mmss(Duration::from_secs(125)), "2:05");
        assert_eq!(estimate_remaining(Duration::from_secs(9), 3, 3), Duration::ZERO);
    }

    #[test]
    fn byte_percent_bounds() {
        assert_eq!(byte_percent(0, 200), 0.0);
        assert_eq!(byte_percent(50, 200), 25.0);
        assert_eq!(byte_percent(0, 0), 100.0);
    }

    #[test]
    fn mode_parses_from_form_text() {
        assert_eq!("".parse::<UploadMode>(), Ok(UploadMode::Concurrent));
        assert_eq!("Sequential".parse::<UploadMode>(), Ok(UploadMode::Sequential));
        assert!("parallel".parse::<UploadMode>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_partial_failure_still_refreshes_once() {
        let dev = FakeDevice::with_files(&[]);
        dev.fail_upload("2.txt");
        // completion order: 3, 2, 1
        dev.delay_upload("1.txt", Duration::from_millis(300));
        dev.delay_upload("2.txt", Duration::from_millis(200));
        dev.delay_upload("3.txt", Duration::from_millis(100));

        let board = UploadBoard::new();
        let id = board.start(UploadMode::Concurrent, &names(&["1.txt", "2.txt", "3.txt"]));
        let report = run_batch(&dev, &board, id, UploadMode::Concurrent, files(&["1.txt", "2.txt", "3.txt"])).await;

        assert_eq!(report, BatchReport { succeeded: 2, failed: 1, refresh: true, aborted_at: None });
        assert_eq!(dev.calls("/upload"), 3);

        let batch = board.snapshot().unwrap();
        assert!(batch.done);
        assert_eq!(batch.finished, 3);
        let outcomes: Vec<_> = batch.tasks.iter().map(|t| t.outcome).collect();
        assert_eq!(outcomes, vec![UploadOutcome::Succeeded, UploadOutcome::Failed, UploadOutcome::Succeeded]);
        assert!(batch.tasks[0].label.ends_with(SUCCESS_MARKER));
        assert!(batch.tasks[1].label.ends_with(FAILURE_MARKER));
        assert_eq!(batch.tasks[1].progress_percent, 50.0);
        assert_eq!(batch.tasks[2].progress_percent, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_uploads_overlap() {
        let dev = FakeDevice::with_files(&[]);
        for n in ["a", "b", "c"] {
            dev.delay_upload(n, Duration::from_secs(1));
        }
        let board = UploadBoard::new();
        let id = board.start(UploadMode::Concurrent, &names(&["a", "b", "c"]));

        let started = Instant::now();
        run_batch(&dev, &board, id, UploadMode::Concurrent, files(&["a", "b", "c"])).await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_tracks_eta() {
        let dev = FakeDevice::with_files(&[]);
        for n in ["a", "b", "c", "d"] {
            dev.delay_upload(n, Duration::from_secs(10));
        }
        let board = UploadBoard::new();
        let id = board.start(UploadMode::Sequential, &names(&["a", "b", "c", "d"]));
        let report = run_batch(&dev, &board, id, UploadMode::Sequential, files(&["a", "b", "c", "d"])).await;

        assert_eq!(report.succeeded, 4);
        assert!(report.refresh);
        assert_eq!(*dev.uploaded.lock().unwrap(), names(&["a", "b", "c", "d"]));

        let batch = board.snapshot().unwrap();
        assert_eq!(batch.overall_percent, 100);
        assert_eq!(batch.eta.as_deref(), Some("0:00"));
        assert!(batch.done);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_eta_midway() {
        let dev = FakeDevice::with_files(&[]);
        dev.delay_upload("a", Duration::from_secs(20));
        dev.fail_upload("b");
        let board = UploadBoard::new();
        let id = board.start(UploadMode::Sequential, &names(&["a", "b", "c", "d"]));
        run_batch(&dev, &board, id, UploadMode::Sequential, files(&["a", "b", "c", "d"])).await;

        // after "a": 20s elapsed / 1 done * 3 left
        let batch = board.snapshot().unwrap();
        assert_eq!(batch.overall_percent, 25);
        assert_eq!(batch.eta.as_deref(), Some("1:00"));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_stops_at_first_failure() {
        let dev = FakeDevice::with_files(&[]);
        dev.fail_upload("b");
        let board = UploadBoard::new();
        let id = board.start(UploadMode::Sequential, &names(&["a", "b", "c"]));
        let report = run_batch(&dev, &board, id, UploadMode::Sequential, files(&["a", "b", "c"])).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.aborted_at.as_deref(), Some("b"));
        assert!(!report.refresh);
        assert_eq!(dev.calls("/upload"), 2);

        let batch = board.snapshot().unwrap();
        assert!(batch.done);
        assert!(batch.error.as_deref().unwrap_or_default().contains("b"));
        assert_eq!(batch.tasks[2].outcome, UploadOutcome::Pending);
    }

    #[tokio::test]
    async fn empty_batch_does_nothing() {
        let dev = FakeDevice::with_files(&[]);
        let board = UploadBoard::new();
        let id = board.start(UploadMode::Concurrent, &[]);
        let report = run_batch(&dev, &board, id, UploadMode::Concurrent, Vec::new()).await;
        assert_eq!(report, BatchReport::default());
        assert_eq!(dev.total_calls(), 0);
    }

    #[tokio::test]
    async fn superseded_batch_cannot_touch_the_board() {
        let dev = FakeDevice::with_files(&[]);
        let board = UploadBoard::new();
        let old = board.start(UploadMode::Concurrent, &names(&["old"]));
        let current = board.start(UploadMode::Concurrent, &names(&["new"]));

        run_batch(&dev, &board, old, UploadMode::Concurrent, files(&["old"])).await;

        let batch = board.snapshot().unwrap();
        assert_eq!(batch.id, current);
        assert_eq!(batch.finished, 0);
        assert_eq!(batch.tasks[0].outcome, UploadOutcome::Pending);
        assert!(!batch.done);
    }
}
