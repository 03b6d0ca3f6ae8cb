use std::path::PathBuf;
use thiserror::Error;

/// Longest slice of a response body kept in a `ParseError`.
const SNIPPET_LEN: usize = 200;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned error {code}: {text}")]
    Api { code: String, text: String },

    #[error("Failed to parse report listing: {message} (near: {snippet:?})")]
    Parse { message: String, snippet: String },

    #[error("File system error at {}: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Stats(#[from] csv::Error),

    #[error("Operation cancelled by shutdown")]
    Cancelled,
}

impl SyncError {
    pub fn parse(message: impl Into<String>, raw: &str) -> Self {
        let snippet = match raw.char_indices().nth(SNIPPET_LEN) {
            Some((end, _)) => format!("{}...", &raw[..end]),
            None => raw.to_string(),
        };
        SyncError::Parse {
            message: message.into(),
            snippet,
        }
    }

    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Errors that must stop the process instead of being retried next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Config(_) | SyncError::Auth(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Transport(format!("request timed out: {}", e))
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Config(e.to_string())
    }
}
