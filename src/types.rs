use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Finished,
    Other,
}

impl ReportStatus {
    pub fn from_state(state: &str) -> Self {
        if state.trim().eq_ignore_ascii_case("finished") {
            ReportStatus::Finished
        } else {
            ReportStatus::Other
        }
    }
}

/// One `REPORT` element of the remote listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReport {
    pub id: String,
    pub title: String,
    pub output_format: String,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub title: String,
    pub remote_id: String,
    pub last_fetched_id: Option<String>,
    pub output_format: String,
    pub status: ReportStatus,
}

impl ReportRecord {
    /// A finished report whose current version has not been downloaded.
    pub fn is_pending(&self) -> bool {
        self.status == ReportStatus::Finished
            && self.last_fetched_id.as_deref() != Some(self.remote_id.as_str())
    }

    pub fn to_task(&self) -> DownloadTask {
        DownloadTask {
            title: self.title.clone(),
            remote_id: self.remote_id.clone(),
            output_format: self.output_format.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub title: String,
    pub remote_id: String,
    pub output_format: String,
}

impl DownloadTask {
    pub fn key(&self) -> TaskKey {
        TaskKey {
            title: self.title.clone(),
            remote_id: self.remote_id.clone(),
        }
    }
}

/// Identity used to de-duplicate queued and in-flight tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub title: String,
    pub remote_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Fetched,
    AlreadyPresent,
    Failed,
    Aborted,
}

impl DownloadStatus {
    /// Whether the catalog may record this version as fetched.
    pub fn is_complete(self) -> bool {
        matches!(self, DownloadStatus::Fetched | DownloadStatus::AlreadyPresent)
    }
}

#[derive(Debug)]
pub struct DownloadOutcome {
    pub task: DownloadTask,
    pub output_path: PathBuf,
    pub status: DownloadStatus,
    pub bytes_downloaded: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct CycleSummary {
    pub listed: usize,
    pub pending: usize,
    pub enqueued: usize,
    pub fetched: usize,
    pub already_present: usize,
    pub failed: usize,
    pub aborted: usize,
    pub total_bytes_downloaded: u64,
    pub total_duration: Duration,
}

impl CycleSummary {
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome.status {
            DownloadStatus::Fetched => self.fetched += 1,
            DownloadStatus::AlreadyPresent => self.already_present += 1,
            DownloadStatus::Failed => self.failed += 1,
            DownloadStatus::Aborted => self.aborted += 1,
        }
        self.total_bytes_downloaded += outcome.bytes_downloaded;
    }
}
