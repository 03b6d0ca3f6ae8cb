//! Top-level driver: login, then poll, reconcile and dispatch on a fixed
//! cadence until cancelled, then log out.

use crate::catalog::Catalog;
use crate::config::Config;
use crate::downloader::{write_stats_csv, Dispatcher, DispatcherOptions};
use crate::error::SyncError;
use crate::parser;
use crate::session::ReportService;
use crate::types::{CycleSummary, DownloadOutcome};
use colored::*;
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Authenticated,
    Polling,
    Dispatching,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub title_prefixes: Vec<String>,
    pub allowed_output_formats: Vec<String>,
    pub poll_interval: Duration,
    pub once: bool,
    pub dispatcher: DispatcherOptions,
}

impl SyncOptions {
    pub fn from_config(config: &Config, once: bool, show_progress: bool) -> Self {
        Self {
            title_prefixes: config.title_prefixes.clone(),
            allowed_output_formats: config.allowed_output_formats.clone(),
            poll_interval: config.poll_interval(),
            once,
            dispatcher: DispatcherOptions {
                worker_count: config.download_worker_count,
                download_dir: config.download_dir.clone(),
                timeout: config.download_timeout(),
                show_progress,
            },
        }
    }

    /// Output formats compare ASCII case-insensitively.
    fn format_allowed(&self, format: &str) -> bool {
        self.allowed_output_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(format))
    }

    fn download_dir(&self) -> &Path {
        &self.dispatcher.download_dir
    }
}

pub struct SyncLoop {
    service: Arc<dyn ReportService>,
    options: SyncOptions,
    catalog: Catalog,
    cancel: CancellationToken,
    state: LoopState,
    authenticated: bool,
    cycles: u64,
}

impl SyncLoop {
    pub fn new(service: Arc<dyn ReportService>, options: SyncOptions, cancel: CancellationToken) -> Self {
        Self {
            service,
            options,
            catalog: Catalog::new(),
            cancel,
            state: LoopState::Starting,
            authenticated: false,
            cycles: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn transition(&mut self, next: LoopState) {
        debug!("Sync loop {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs until cancelled (or after one cycle with `once`).
    ///
    /// Only a failed initial login is returned as an error. Every other
    /// failure abandons the current cycle and the loop carries on.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        info!("Starting report synchronization");
        self.transition(LoopState::Starting);

        if let Err(e) = self.service.login().await {
            error!("Initial login failed: {}", e);
            self.transition(LoopState::Stopped);
            return Err(e);
        }
        self.authenticated = true;
        self.transition(LoopState::Authenticated);

        let mut dispatcher = Dispatcher::start(
            Arc::clone(&self.service),
            self.options.dispatcher.clone(),
            self.cancel.clone(),
        );

        while !self.cancel.is_cancelled() {
            self.cycles += 1;
            match self.run_cycle(&mut dispatcher).await {
                Ok(summary) => report_summary(self.cycles, &summary),
                Err(SyncError::Cancelled) => break,
                Err(SyncError::Auth(msg)) => {
                    error!("Cycle {} abandoned, session lost: {}", self.cycles, msg);
                    self.authenticated = false;
                }
                Err(e) => error!("Cycle {} abandoned: {}", self.cycles, e),
            }

            if self.options.once || self.cancel.is_cancelled() {
                break;
            }

            debug!("Sleeping for {:?}", self.options.poll_interval);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown requested while sleeping");
                    break;
                }
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }

        self.transition(LoopState::Stopping);
        dispatcher.shutdown().await;
        self.service.logout().await;
        self.authenticated = false;
        self.transition(LoopState::Stopped);
        info!(
            "Stopped after {} cycle(s), {} report(s) known, {} pending",
            self.cycles,
            self.catalog.len(),
            self.catalog.pending_count()
        );
        Ok(())
    }

    async fn run_cycle(&mut self, dispatcher: &mut Dispatcher) -> Result<CycleSummary, SyncError> {
        let start_time = Instant::now();
        let mut summary = CycleSummary::default();

        if !self.authenticated {
            info!("Re-authenticating before polling");
            self.service.login().await?;
            self.authenticated = true;
        }

        self.transition(LoopState::Polling);
        let listing = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            res = parser::fetch_listing(self.service.as_ref()) => res?,
        };
        let pending = self
            .catalog
            .reconcile(&listing, &self.options.title_prefixes);
        summary.listed = listing.len();
        summary.pending = pending.len();
        debug!("{} listed, {} pending", summary.listed, summary.pending);

        self.transition(LoopState::Dispatching);
        for record in &pending {
            if !self.options.format_allowed(&record.output_format) {
                debug!(
                    "Skipping report {} with output format {}",
                    record.title, record.output_format
                );
                continue;
            }
            match dispatcher.enqueue(record.to_task()).await {
                Ok(true) => summary.enqueued += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Stopped enqueuing: {}", e);
                    break;
                }
            }
        }

        debug!("Waiting for {} download(s)", dispatcher.outstanding());
        let mut outcomes = Vec::with_capacity(summary.enqueued);
        while let Some(outcome) = dispatcher.next_outcome().await {
            self.apply_outcome(&outcome);
            summary.record(&outcome);
            outcomes.push(outcome);
        }

        if let Err(e) = write_stats_csv(&outcomes, self.options.download_dir()).await {
            error!("Failed to write stats CSV: {}", e);
        }

        summary.total_duration = start_time.elapsed();
        Ok(summary)
    }

    fn apply_outcome(&mut self, outcome: &DownloadOutcome) {
        let task = &outcome.task;
        if outcome.status.is_complete() {
            if !self.catalog.mark_fetched(&task.title, &task.remote_id) {
                if let Some(current) = self.catalog.get(&task.title) {
                    info!(
                        "Report {} ({}) was superseded by {} while downloading",
                        task.title, task.remote_id, current.remote_id
                    );
                }
            }
        } else {
            debug!(
                "Report {} ({}) left pending: {:?}",
                task.title, task.remote_id, outcome.status
            );
        }
    }
}

fn report_summary(cycle: u64, summary: &CycleSummary) {
    info!(
        "Cycle {}: {} listed, {} pending, {} enqueued, {} fetched, {} already present, {} failed, {} aborted, {} bytes in {:.2?}",
        cycle,
        summary.listed,
        summary.pending,
        summary.enqueued,
        summary.fetched,
        summary.already_present,
        summary.failed,
        summary.aborted,
        summary.total_bytes_downloaded,
        summary.total_duration
    );
    if summary.enqueued == 0 {
        return;
    }
    println!(
        "{} {} fetched, {} already present, {} failed, {} aborted ({:.2} MB)",
        format!("Cycle {}:", cycle).bold(),
        summary.fetched.to_string().green(),
        summary.already_present,
        summary.failed.to_string().red(),
        summary.aborted.to_string().yellow(),
        summary.total_bytes_downloaded as f64 / 1_048_576.0
    );
}
