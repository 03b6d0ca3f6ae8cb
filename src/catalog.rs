//! In-memory registry of known report titles and their fetch state.
//!
//! The catalog has a single owner (the sync loop). Workers never touch it;
//! their outcomes are applied through [`Catalog::mark_fetched`].

use crate::types::{RemoteReport, ReportRecord, ReportStatus};
use log::debug;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct Catalog {
    records: HashMap<String, ReportRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, title: &str) -> Option<&ReportRecord> {
        self.records.get(title)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Folds a listing into the catalog and returns the records still
    /// pending among the titles it contains, in listing order.
    ///
    /// Only finished reports whose title starts with one of `prefixes` are
    /// catalogued. When a title is listed more than once, the first entry wins.
    pub fn reconcile(&mut self, listing: &[RemoteReport], prefixes: &[String]) -> Vec<ReportRecord> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending = Vec::new();

        for entry in listing {
            if entry.status != ReportStatus::Finished {
                debug!("Skipping unfinished report {} ({})", entry.title, entry.id);
                continue;
            }
            if !prefixes.iter().any(|p| entry.title.starts_with(p.as_str())) {
                debug!("Skipping report {}, no matching prefix", entry.title);
                continue;
            }
            if !seen.insert(entry.title.as_str()) {
                debug!("Ignoring duplicate listing of {} ({})", entry.title, entry.id);
                continue;
            }

            let record = self
                .records
                .entry(entry.title.clone())
                .or_insert_with(|| {
                    debug!("Adding new report {} ({})", entry.title, entry.id);
                    ReportRecord {
                        title: entry.title.clone(),
                        remote_id: entry.id.clone(),
                        last_fetched_id: None,
                        output_format: entry.output_format.clone(),
                        status: entry.status,
                    }
                });
            if record.remote_id != entry.id {
                debug!(
                    "Report {} regenerated: {} -> {}",
                    entry.title, record.remote_id, entry.id
                );
                record.remote_id = entry.id.clone();
                record.output_format = entry.output_format.clone();
                record.status = entry.status;
            }

            if record.is_pending() {
                pending.push(record.clone());
            }
        }

        pending
    }

    /// Records a completed download. Returns `false` if the title is unknown
    /// or a newer version superseded `remote_id` while it was in flight.
    pub fn mark_fetched(&mut self, title: &str, remote_id: &str) -> bool {
        match self.records.get_mut(title) {
            Some(record) if record.remote_id == remote_id => {
                record.last_fetched_id = Some(remote_id.to_string());
                true
            }
            Some(record) => {
                debug!(
                    "Stale completion for {} ({}), current version is {}",
                    title, remote_id, record.remote_id
                );
                false
            }
            None => {
                debug!("Completion for unknown report {} ({})", title, remote_id);
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.records.values().filter(|r| r.is_pending()).count()
    }
}
