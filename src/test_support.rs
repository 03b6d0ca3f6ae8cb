//! Scripted in-memory report service used by unit tests.

use crate::error::SyncError;
use crate::session::{ByteStream, ReportService};
use async_trait::async_trait;
use futures::stream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{Notify, Semaphore};

#[derive(Clone)]
pub enum FetchBehavior {
    Body(Vec<u8>),
    /// Yields the bytes, then a transport error.
    FailAfter(Vec<u8>),
    /// Yields the bytes, then never ends.
    Hang(Vec<u8>),
    /// Waits for [`FakeService::open_gate`] before answering.
    Gated(Vec<u8>),
}

pub struct FakeService {
    listing: Mutex<Result<String, String>>,
    fetches: Mutex<HashMap<String, FetchBehavior>>,
    fetch_calls: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    reject_login: AtomicBool,
    expire_session: AtomicBool,
    fetched: Notify,
    gate: Semaphore,
}

impl Default for FakeService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            listing: Mutex::new(Ok(listing_xml(&[]))),
            fetches: Mutex::new(HashMap::new()),
            fetch_calls: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            reject_login: AtomicBool::new(false),
            expire_session: AtomicBool::new(false),
            fetched: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    pub fn set_listing(&self, body: String) {
        *self.listing.lock().unwrap() = Ok(body);
    }

    pub fn fail_listing(&self, message: &str) {
        *self.listing.lock().unwrap() = Err(message.to_string());
    }

    pub fn set_fetch(&self, remote_id: &str, behavior: FetchBehavior) {
        self.fetches
            .lock()
            .unwrap()
            .insert(remote_id.to_string(), behavior);
    }

    pub fn reject_login(&self, reject: bool) {
        self.reject_login.store(reject, Ordering::SeqCst);
    }

    /// Makes the next listing fail with an authentication error.
    pub fn expire_session(&self) {
        self.expire_session.store(true, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> Vec<String> {
        self.fetch_calls.lock().unwrap().clone()
    }

    pub fn open_gate(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub async fn wait_for_fetch(&self) {
        self.fetched.notified().await;
    }
}

#[async_trait]
impl ReportService for FakeService {
    async fn login(&self) -> Result<(), SyncError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_login.load(Ordering::SeqCst) {
            return Err(SyncError::Auth("login rejected with HTTP 401".into()));
        }
        Ok(())
    }

    async fn logout(&self) {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn list_finished(&self) -> Result<String, SyncError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.expire_session.swap(false, Ordering::SeqCst) {
            return Err(SyncError::Auth("session rejected while listing reports".into()));
        }
        self.listing
            .lock()
            .unwrap()
            .clone()
            .map_err(SyncError::Transport)
    }

    async fn fetch_report(&self, remote_id: &str) -> Result<ByteStream, SyncError> {
        self.fetch_calls.lock().unwrap().push(remote_id.to_string());
        self.fetched.notify_one();
        let behavior = self.fetches.lock().unwrap().get(remote_id).cloned();
        match behavior {
            Some(FetchBehavior::Body(body)) => {
                let (head, tail) = body.split_at(body.len() / 2);
                Ok(stream::iter(vec![Ok(head.to_vec()), Ok(tail.to_vec())]).boxed())
            }
            Some(FetchBehavior::FailAfter(body)) => Ok(stream::iter(vec![
                Ok(body),
                Err(SyncError::Transport("connection reset by peer".into())),
            ])
            .boxed()),
            Some(FetchBehavior::Hang(body)) => {
                Ok(stream::iter(vec![Ok(body)]).chain(stream::pending()).boxed())
            }
            Some(FetchBehavior::Gated(body)) => {
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|e| SyncError::Transport(e.to_string()))?;
                Ok(stream::iter(vec![Ok(body)]).boxed())
            }
            None => Err(SyncError::Transport(format!(
                "fetch of report {} returned HTTP 404 Not Found",
                remote_id
            ))),
        }
    }
}

/// Builds a listing document from `(id, title, format, state)` rows.
pub fn listing_xml(reports: &[(&str, &str, &str, &str)]) -> String {
    let mut body = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<REPORT_LIST_OUTPUT><RESPONSE><REPORT_LIST>",
    );
    for (id, title, format, state) in reports {
        body.push_str(&format!(
            "<REPORT><ID>{}</ID><TITLE><![CDATA[{}]]></TITLE><OUTPUT_FORMAT>{}</OUTPUT_FORMAT>\
             <STATUS><STATE>{}</STATE></STATUS></REPORT>",
            id, title, format, state
        ));
    }
    body.push_str("</REPORT_LIST></RESPONSE></REPORT_LIST_OUTPUT>");
    body
}
