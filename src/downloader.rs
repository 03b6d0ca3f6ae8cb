use crate::error::SyncError;
use crate::session::ReportService;
use crate::types::{DownloadOutcome, DownloadStatus, DownloadTask, TaskKey};
use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const QUEUE_CAPACITY: usize = 64;
const STATS_FILE: &str = "download_stats.csv";

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub worker_count: usize,
    pub download_dir: PathBuf,
    /// Bound on the fetch request and on each wait for the next chunk
    pub timeout: Duration,
    pub show_progress: bool,
}

type TrackedKeys = Arc<Mutex<HashSet<TaskKey>>>;

/// Bounded download queue served by a fixed pool of workers.
///
/// Tasks go in through [`Dispatcher::enqueue`]; every accepted task produces
/// exactly one [`DownloadOutcome`] on [`Dispatcher::next_outcome`].
pub struct Dispatcher {
    queue_tx: Option<mpsc::Sender<DownloadTask>>,
    tracked: TrackedKeys,
    results_rx: mpsc::UnboundedReceiver<DownloadOutcome>,
    workers: Vec<JoinHandle<()>>,
    outstanding: usize,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn start(
        service: Arc<dyn ReportService>,
        options: DispatcherOptions,
        cancel: CancellationToken,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));
        let tracked: TrackedKeys = Arc::new(Mutex::new(HashSet::new()));

        let progress = if options.show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let workers = (0..options.worker_count.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    service: Arc::clone(&service),
                    download_dir: options.download_dir.clone(),
                    timeout: options.timeout,
                    progress: progress.clone(),
                    cancel: cancel.clone(),
                };
                let queue_rx = Arc::clone(&queue_rx);
                let results_tx = results_tx.clone();
                let tracked = Arc::clone(&tracked);
                tokio::spawn(worker.run(queue_rx, results_tx, tracked))
            })
            .collect();

        info!("Started {} download workers", options.worker_count.max(1));
        Self {
            queue_tx: Some(queue_tx),
            tracked,
            results_rx,
            workers,
            outstanding: 0,
            cancel,
        }
    }

    /// Queues a task unless the same title and remote id is already queued
    /// or in flight. Returns whether the task was accepted.
    pub async fn enqueue(&mut self, task: DownloadTask) -> Result<bool, SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let tx = self.queue_tx.as_ref().ok_or(SyncError::Cancelled)?;

        let key = task.key();
        let inserted = lock(&self.tracked).insert(key.clone());
        if !inserted {
            debug!("Report {} ({}) already queued", task.title, task.remote_id);
            return Ok(false);
        }

        debug!("Enqueuing {} ({})", task.title, task.remote_id);
        let sent = tokio::select! {
            res = tx.send(task) => res.is_ok(),
            _ = self.cancel.cancelled() => false,
        };
        if !sent {
            lock(&self.tracked).remove(&key);
            return Err(SyncError::Cancelled);
        }
        self.outstanding += 1;
        Ok(true)
    }

    /// Number of accepted tasks whose outcome has not been collected yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Waits for the next finished task, or `None` once nothing is outstanding.
    pub async fn next_outcome(&mut self) -> Option<DownloadOutcome> {
        if self.outstanding == 0 {
            return None;
        }
        let outcome = self.results_rx.recv().await?;
        self.outstanding -= 1;
        Some(outcome)
    }

    /// Closes the queue and waits for every worker to exit.
    pub async fn shutdown(mut self) {
        self.queue_tx.take();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!("Download worker panicked: {}", e);
            }
        }
        debug!("Download workers stopped");
    }
}

fn lock(tracked: &TrackedKeys) -> MutexGuard<'_, HashSet<TaskKey>> {
    tracked.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Worker {
    id: usize,
    service: Arc<dyn ReportService>,
    download_dir: PathBuf,
    timeout: Duration,
    progress: MultiProgress,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(
        self,
        queue_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<DownloadTask>>>,
        results_tx: mpsc::UnboundedSender<DownloadOutcome>,
        tracked: TrackedKeys,
    ) {
        loop {
            let next = {
                let mut rx = queue_rx.lock().await;
                tokio::select! {
                    biased;
                    task = rx.recv() => task,
                    _ = self.cancel.cancelled() => rx.try_recv().ok(),
                }
            };
            let Some(task) = next else { break };

            let outcome = if self.cancel.is_cancelled() {
                debug!("Worker {} dropping {} ({}) on shutdown", self.id, task.title, task.remote_id);
                DownloadOutcome {
                    output_path: destination_path(&self.download_dir, &task),
                    task,
                    status: DownloadStatus::Aborted,
                    bytes_downloaded: 0,
                    duration: Duration::ZERO,
                    error: Some(SyncError::Cancelled.to_string()),
                }
            } else {
                self.download(task).await
            };

            lock(&tracked).remove(&outcome.task.key());
            if results_tx.send(outcome).is_err() {
                break;
            }
        }
        debug!("Worker {} exiting", self.id);
    }

    async fn download(&self, task: DownloadTask) -> DownloadOutcome {
        let start_time = Instant::now();
        let output_path = destination_path(&self.download_dir, &task);
        let pb = self.progress.add(create_progress_bar(&output_path));
        let mut downloaded: u64 = 0;

        let result = self.fetch_into(&task, &output_path, &mut downloaded, &pb).await;

        let (status, error) = match result {
            Ok(status) => {
                match status {
                    DownloadStatus::AlreadyPresent => {
                        info!("Report {} already on disk at {}", task.title, output_path.display())
                    }
                    _ => info!(
                        "Downloaded report {} ({}) to {} ({} bytes)",
                        task.title,
                        task.remote_id,
                        output_path.display(),
                        downloaded
                    ),
                }
                (status, None)
            }
            Err(SyncError::Cancelled) => {
                warn!("Download of {} ({}) aborted by shutdown", task.title, task.remote_id);
                (DownloadStatus::Aborted, Some(SyncError::Cancelled.to_string()))
            }
            Err(e) => {
                let error_msg = e.to_string();
                error!("Download failed for {} ({}): {}", task.title, task.remote_id, error_msg);
                (DownloadStatus::Failed, Some(error_msg))
            }
        };

        pb.finish_and_clear();
        self.progress.remove(&pb);

        DownloadOutcome {
            task,
            output_path,
            status,
            bytes_downloaded: downloaded,
            duration: start_time.elapsed(),
            error,
        }
    }

    async fn fetch_into(
        &self,
        task: &DownloadTask,
        output_path: &Path,
        downloaded: &mut u64,
        pb: &ProgressBar,
    ) -> Result<DownloadStatus, SyncError> {
        if already_present(output_path).await? {
            return Ok(DownloadStatus::AlreadyPresent);
        }

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| SyncError::fs(&self.download_dir, e))?;

        let temp_path = temp_path_for(output_path);
        if let Err(e) = self.stream_to_file(task, &temp_path, downloaded, pb).await {
            remove_temp(&temp_path).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&temp_path, output_path).await {
            remove_temp(&temp_path).await;
            return Err(SyncError::fs(output_path, e));
        }
        Ok(DownloadStatus::Fetched)
    }

    async fn stream_to_file(
        &self,
        task: &DownloadTask,
        temp_path: &Path,
        downloaded: &mut u64,
        pb: &ProgressBar,
    ) -> Result<(), SyncError> {
        info!("Downloading report {} ({}) as {}", task.title, task.remote_id, temp_path.display());
        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            res = timeout(self.timeout, self.service.fetch_report(&task.remote_id)) => {
                res.map_err(|_| SyncError::Transport(format!(
                    "fetch of report {} timed out after {:?}", task.remote_id, self.timeout
                )))??
            }
        };

        let mut file = File::create(temp_path)
            .await
            .map_err(|e| SyncError::fs(temp_path, e))?;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                res = timeout(self.timeout, stream.next()) => res.map_err(|_| {
                    SyncError::Transport(format!(
                        "no data for report {} within {:?}", task.remote_id, self.timeout
                    ))
                })?,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::fs(temp_path, e))?;
            *downloaded += chunk.len() as u64;
            pb.set_position(*downloaded);
        }

        file.flush().await.map_err(|e| SyncError::fs(temp_path, e))?;
        file.sync_all().await.map_err(|e| SyncError::fs(temp_path, e))?;
        Ok(())
    }
}

/// Final location of a report version: `{title}-{remote_id}-RAW.{format}`.
pub fn destination_path(download_dir: &Path, task: &DownloadTask) -> PathBuf {
    let filename = format!(
        "{}-{}-RAW.{}",
        sanitize(&task.title),
        sanitize(&task.remote_id),
        sanitize(&task.output_format.to_ascii_lowercase())
    );
    download_dir.join(filename)
}

fn temp_path_for(output_path: &Path) -> PathBuf {
    let name = output_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("report");
    output_path.with_file_name(format!(".{}.part", name))
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ' ' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn already_present(path: &Path) -> Result<bool, SyncError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file() && meta.len() > 0),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::fs(path, e)),
    }
}

async fn remove_temp(temp_path: &Path) {
    match tokio::fs::remove_file(temp_path).await {
        Ok(()) => debug!("Removed partial file {}", temp_path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => error!("Failed to remove partial file {}: {}", temp_path.display(), e),
    }
}

fn create_progress_bar(output_path: &Path) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg} {bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(
        output_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string(),
    );
    pb
}

/// Appends one row per outcome to `download_stats.csv` in `output_dir`.
pub async fn write_stats_csv(outcomes: &[DownloadOutcome], output_dir: &Path) -> Result<(), SyncError> {
    if outcomes.is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| SyncError::fs(output_dir, e))?;

    let stats_path = output_dir.join(STATS_FILE);
    let write_header = match tokio::fs::metadata(&stats_path).await {
        Ok(_) => false,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => return Err(SyncError::fs(&stats_path, e)),
    };
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());

    if write_header {
        wtr.write_record([
            "Timestamp",
            "Filename",
            "Title",
            "Remote ID",
            "Status",
            "Size (MB)",
            "Duration (s)",
            "Error",
        ])?;
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    for outcome in outcomes {
        let filename = outcome
            .output_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        wtr.write_record([
            timestamp.to_string(),
            filename.to_string(),
            outcome.task.title.clone(),
            outcome.task.remote_id.clone(),
            format!("{:?}", outcome.status),
            format!("{:.2}", outcome.bytes_downloaded as f64 / 1_048_576.0),
            format!("{:.2}", outcome.duration.as_secs_f64()),
            outcome.error.clone().unwrap_or_default(),
        ])?;
    }

    let rows = wtr
        .into_inner()
        .map_err(|e| SyncError::fs(&stats_path, e.into_error()))?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&stats_path)
        .await
        .map_err(|e| SyncError::fs(&stats_path, e))?;
    file.write_all(&rows)
        .await
        .map_err(|e| SyncError::fs(&stats_path, e))?;
    file.flush().await.map_err(|e| SyncError::fs(&stats_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeService, FetchBehavior};
    use tempfile::TempDir;

    fn task(title: &str, id: &str) -> DownloadTask {
        DownloadTask {
            title: title.into(),
            remote_id: id.into(),
            output_format: "pdf".into(),
        }
    }

    fn options(dir: &Path, workers: usize) -> DispatcherOptions {
        DispatcherOptions {
            worker_count: workers,
            download_dir: dir.to_path_buf(),
            timeout: Duration::from_secs(5),
            show_progress: false,
        }
    }

    async fn drain(dispatcher: &mut Dispatcher) -> Vec<DownloadOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = dispatcher.next_outcome().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn destination_is_deterministic_and_sanitized() {
        let dir = Path::new("/data");
        let path = destination_path(dir, &task("CUT/Weekly: all", "77"));
        assert_eq!(path, PathBuf::from("/data/CUT_Weekly_ all-77-RAW.pdf"));
        assert_eq!(path, destination_path(dir, &task("CUT/Weekly: all", "77")));
        assert_ne!(path, destination_path(dir, &task("CUT/Weekly: all", "78")));
        assert_eq!(
            temp_path_for(&path),
            PathBuf::from("/data/.CUT_Weekly_ all-77-RAW.pdf.part")
        );
    }

    #[tokio::test]
    async fn downloads_into_final_path() {
        let tmp = TempDir::new().unwrap();
        let service = Arc::new(FakeService::new());
        service.set_fetch("1", FetchBehavior::Body(b"report body".to_vec()));

        let mut dispatcher =
            Dispatcher::start(service.clone(), options(tmp.path(), 2), CancellationToken::new());
        assert!(dispatcher.enqueue(task("CUT-Weekly", "1")).await.unwrap());
        let outcomes = drain(&mut dispatcher).await;
        dispatcher.shutdown().await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, DownloadStatus::Fetched);
        assert_eq!(outcomes[0].bytes_downloaded, 11);
        let written = std::fs::read(&outcomes[0].output_path).unwrap();
        assert_eq!(written, b"report body");
        assert_eq!(dir_entries(tmp.path()), vec!["CUT-Weekly-1-RAW.pdf"]);
    }

    #[tokio::test]
    async fn duplicate_enqueue_processes_once() {
        let tmp = TempDir::new().unwrap();
        let service = Arc::new(FakeService::new());
        service.set_fetch("1", FetchBehavior::Gated(b"body".to_vec()));

        let mut dispatcher =
            Dispatcher::start(service.clone(), options(tmp.path(), 4), CancellationToken::new());
        assert!(dispatcher.enqueue(task("CUT-Weekly", "1")).await.unwrap());
        assert!(!dispatcher.enqueue(task("CUT-Weekly", "1")).await.unwrap());
        assert_eq!(dispatcher.outstanding(), 1);

        service.open_gate();
        let outcomes = drain(&mut dispatcher).await;
        dispatcher.shutdown().await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(service.fetch_calls(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn stream_failure_leaves_no_files() {
        let tmp = TempDir::new().unwrap();
        let service = Arc::new(FakeService::new());
        service.set_fetch("1", FetchBehavior::FailAfter(b"partial".to_vec()));

        let mut dispatcher =
            Dispatcher::start(service.clone(), options(tmp.path(), 1), CancellationToken::new());
        dispatcher.enqueue(task("CUT-Weekly", "1")).await.unwrap();
        let outcomes = drain(&mut dispatcher).await;
        dispatcher.shutdown().await;

        assert_eq!(outcomes[0].status, DownloadStatus::Failed);
        assert!(outcomes[0].error.as_deref().unwrap().contains("connection reset"));
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn stream_failure_does_not_touch_existing_empty_destination() {
        let tmp = TempDir::new().unwrap();
        let existing = destination_path(tmp.path(), &task("CUT-Weekly", "1"));
        std::fs::write(&existing, b"").unwrap();

        let service = Arc::new(FakeService::new());
        service.set_fetch("1", FetchBehavior::FailAfter(b"partial".to_vec()));
        let mut dispatcher =
            Dispatcher::start(service.clone(), options(tmp.path(), 1), CancellationToken::new());
        dispatcher.enqueue(task("CUT-Weekly", "1")).await.unwrap();
        drain(&mut dispatcher).await;
        dispatcher.shutdown().await;

        assert_eq!(std::fs::metadata(&existing).unwrap().len(), 0);
        assert_eq!(dir_entries(tmp.path()), vec!["CUT-Weekly-1-RAW.pdf"]);
    }

    #[tokio::test]
    async fn existing_file_skips_network() {
        let tmp = TempDir::new().unwrap();
        let existing = destination_path(tmp.path(), &task("CUT-Weekly", "1"));
        std::fs::write(&existing, b"already here").unwrap();

        let service = Arc::new(FakeService::new());
        let mut dispatcher =
            Dispatcher::start(service.clone(), options(tmp.path(), 1), CancellationToken::new());
        dispatcher.enqueue(task("CUT-Weekly", "1")).await.unwrap();
        let outcomes = drain(&mut dispatcher).await;
        dispatcher.shutdown().await;

        assert_eq!(outcomes[0].status, DownloadStatus::AlreadyPresent);
        assert!(service.fetch_calls().is_empty());
        assert_eq!(std::fs::read(&existing).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn fetch_error_is_failed_outcome() {
        let tmp = TempDir::new().unwrap();
        let service = Arc::new(FakeService::new());

        let mut dispatcher =
            Dispatcher::start(service.clone(), options(tmp.path(), 1), CancellationToken::new());
        dispatcher.enqueue(task("CUT-Weekly", "404")).await.unwrap();
        let outcomes = drain(&mut dispatcher).await;
        dispatcher.shutdown().await;

        assert_eq!(outcomes[0].status, DownloadStatus::Failed);
        assert!(!outcomes[0].status.is_complete());
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let tmp = TempDir::new().unwrap();
        let service = Arc::new(FakeService::new());
        service.set_fetch("1", FetchBehavior::Hang(b"first".to_vec()));

        let mut opts = options(tmp.path(), 1);
        opts.timeout = Duration::from_millis(50);
        let mut dispatcher = Dispatcher::start(service.clone(), opts, CancellationToken::new());
        dispatcher.enqueue(task("CUT-Weekly", "1")).await.unwrap();
        let outcomes = drain(&mut dispatcher).await;
        dispatcher.shutdown().await;

        assert_eq!(outcomes[0].status, DownloadStatus::Failed);
        assert!(outcomes[0].error.as_deref().unwrap().contains("no data"));
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_and_queued() {
        let tmp = TempDir::new().unwrap();
        let service = Arc::new(FakeService::new());
        service.set_fetch("1", FetchBehavior::Hang(b"first".to_vec()));
        service.set_fetch("2", FetchBehavior::Body(b"second".to_vec()));
        let cancel = CancellationToken::new();

        let mut dispatcher = Dispatcher::start(service.clone(), options(tmp.path(), 1), cancel.clone());
        dispatcher.enqueue(task("CUT-A", "1")).await.unwrap();
        dispatcher.enqueue(task("CUT-B", "2")).await.unwrap();
        service.wait_for_fetch().await;
        cancel.cancel();

        let outcomes = drain(&mut dispatcher).await;
        assert!(matches!(
            dispatcher.enqueue(task("CUT-C", "3")).await,
            Err(SyncError::Cancelled)
        ));
        dispatcher.shutdown().await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == DownloadStatus::Aborted));
        assert_eq!(service.fetch_calls(), vec!["1".to_string()]);
        assert!(dir_entries(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn stats_csv_is_appended() {
        let tmp = TempDir::new().unwrap();
        let outcome = DownloadOutcome {
            task: task("CUT-Weekly", "1"),
            output_path: tmp.path().join("CUT-Weekly-1-RAW.pdf"),
            status: DownloadStatus::Fetched,
            bytes_downloaded: 2_097_152,
            duration: Duration::from_secs(2),
            error: None,
        };
        write_stats_csv(std::slice::from_ref(&outcome), tmp.path()).await.unwrap();
        write_stats_csv(std::slice::from_ref(&outcome), tmp.path()).await.unwrap();

        let contents = std::fs::read_to_string(tmp.path().join(STATS_FILE)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Timestamp,Filename"));
        assert!(lines[1].contains("CUT-Weekly-1-RAW.pdf,CUT-Weekly,1,Fetched,2.00,2.00,"));
    }

    #[tokio::test]
    async fn stats_csv_on_unwritable_path_is_file_system_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join(STATS_FILE)).unwrap();
        let outcome = DownloadOutcome {
            task: task("CUT-Weekly", "1"),
            output_path: tmp.path().join("CUT-Weekly-1-RAW.pdf"),
            status: DownloadStatus::Failed,
            bytes_downloaded: 0,
            duration: Duration::from_millis(5),
            error: Some("connection reset".into()),
        };

        let err = write_stats_csv(&[outcome], tmp.path()).await.unwrap_err();
        assert!(matches!(err, SyncError::FileSystem { .. }));
    }
}
