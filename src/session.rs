//! Authenticated HTTP session against the report service.
//!
//! All calls are form-encoded POSTs. The session cookie returned by `login`
//! lives in the client's cookie jar and rides along on every later request.

use crate::config::{Config, Credentials};
use crate::error::SyncError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use log::{debug, error, info, warn};
use reqwest::{Client, Response, StatusCode, Url};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub const SESSION_ENDPOINT: &str = "session/";
pub const REPORT_ENDPOINT: &str = "report/";
const REQUESTED_WITH: &str = "report-sync";

/// Report body chunks, read lazily from the network.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, SyncError>>;

/// The operations the synchronization engine needs from the remote service.
#[async_trait]
pub trait ReportService: Send + Sync {
    async fn login(&self) -> Result<(), SyncError>;

    /// Best-effort; failures are logged, never returned.
    async fn logout(&self);

    /// Raw markup of the finished-report listing.
    async fn list_finished(&self) -> Result<String, SyncError>;

    async fn fetch_report(&self, remote_id: &str) -> Result<ByteStream, SyncError>;
}

pub struct SessionClient {
    client: Client,
    base_url: Url,
    credentials: Credentials,
    timeout: Duration,
    logged_in: AtomicBool,
}

impl SessionClient {
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let mut base_url = Url::parse(&config.service_url)
            .map_err(|e| SyncError::Config(format!("service_url: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(config.download_timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            credentials: config.credentials.clone(),
            timeout: config.download_timeout(),
            logged_in: AtomicBool::new(false),
        })
    }

    /// Issues an authenticated POST. Non-success statuses are logged and the
    /// response is still handed back; only transport failures are errors.
    /// The whole exchange, body included, must finish within the timeout.
    pub async fn post(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<Response, SyncError> {
        self.send(endpoint, form, Some(self.timeout)).await
    }

    async fn send(
        &self,
        endpoint: &str,
        form: &[(&str, &str)],
        request_timeout: Option<Duration>,
    ) -> Result<Response, SyncError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| SyncError::Transport(format!("bad endpoint {}: {}", endpoint, e)))?;
        let action = form
            .iter()
            .find(|(k, _)| *k == "action")
            .map(|(_, v)| *v)
            .unwrap_or("?");
        debug!("Posting to {} (action={})", url, action);

        let mut request = self
            .client
            .post(url.clone())
            .header("X-Requested-With", REQUESTED_WITH)
            .form(form);
        if let Some(limit) = request_timeout {
            request = request.timeout(limit);
        }
        let resp = request.send().await?;

        if !resp.status().is_success() {
            error!("Problem posting to {} (action={}): HTTP {}", url, action, resp.status());
        }
        Ok(resp)
    }
}

#[async_trait]
impl ReportService for SessionClient {
    async fn login(&self) -> Result<(), SyncError> {
        info!("Authenticating as {}", self.credentials.username);
        let form = [
            ("action", "login"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];
        let resp = self
            .post(SESSION_ENDPOINT, &form)
            .await
            .map_err(|e| SyncError::Auth(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!("Authentication response: {}", body);
            return Err(SyncError::Auth(format!("login rejected with HTTP {}", status)));
        }
        self.logged_in.store(true, Ordering::SeqCst);
        info!("Authenticated");
        Ok(())
    }

    async fn logout(&self) {
        if !self.logged_in.swap(false, Ordering::SeqCst) {
            debug!("Logout skipped, no active session");
            return;
        }
        info!("Logging out");
        match self.post(SESSION_ENDPOINT, &[("action", "logout")]).await {
            Ok(resp) if resp.status().is_success() => debug!("Logged out"),
            Ok(resp) => warn!("Logout returned HTTP {}", resp.status()),
            Err(e) => error!("Logout failed: {}", e),
        }
    }

    async fn list_finished(&self) -> Result<String, SyncError> {
        info!("Downloading report list");
        let resp = self
            .post(REPORT_ENDPOINT, &[("action", "list"), ("state", "Finished")])
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            self.logged_in.store(false, Ordering::SeqCst);
            return Err(SyncError::Auth("session rejected while listing reports".into()));
        }
        Ok(resp.text().await?)
    }

    /// Unbounded here: the caller times the response and each chunk, so a
    /// large report that keeps flowing is never cut off.
    async fn fetch_report(&self, remote_id: &str) -> Result<ByteStream, SyncError> {
        let resp = self
            .send(REPORT_ENDPOINT, &[("action", "fetch"), ("id", remote_id)], None)
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Transport(format!(
                "fetch of report {} returned HTTP {}",
                remote_id, status
            )));
        }
        Ok(resp
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(SyncError::from)
            .boxed())
    }
}
