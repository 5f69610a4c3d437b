//! Error types for each external boundary of the pipeline.
//!
//! Each port reports its own error enum so callers can tell a recoverable
//! condition (a dropped snapshot, a malformed classifier reply) from a fatal one
//! (a failed poll) without inspecting message strings.

use std::path::PathBuf;

/// Camera transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The camera could not be reached or the connection broke.
    #[error("camera unreachable: {0}")]
    Unreachable(String),

    /// The camera answered with a non-success HTTP status.
    #[error("camera returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The camera answered with an API-level error code.
    #[error("camera command {command} failed (code {code}): {detail}")]
    Command {
        command: String,
        code: i64,
        detail: String,
    },

    /// The response could not be decoded.
    #[error("camera response malformed: {0}")]
    Malformed(String),

    /// A command was issued before `connect()`.
    #[error("camera session not established; call connect() first")]
    NotConnected,
}

/// Classifier backend failures.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// The backend could not be reached or timed out.
    #[error("classifier request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success HTTP status.
    #[error("classifier returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The reply could not be parsed into a verdict.
    #[error("classifier reply malformed: {0}")]
    Malformed(String),

    /// The backend does not implement the requested capability.
    #[error("classifier '{backend}' does not support {capability}")]
    Unsupported {
        backend: &'static str,
        capability: &'static str,
    },
}

/// Automation sink failures.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    /// No bearer token is available for the automation API.
    #[error("automation token not available (set SUPERVISOR_TOKEN)")]
    MissingToken,

    /// The endpoint answered with a non-success status.
    #[error("automation endpoint {url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The endpoint could not be reached.
    #[error("automation endpoint {url} unreachable: {detail}")]
    Transport { url: String, detail: String },
}

/// Evidence filesystem failures.
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read evidence directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    pub(crate) fn from_ureq(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                TransportError::Status { status, body }
            }
            ureq::Error::Transport(transport) => TransportError::Unreachable(transport.to_string()),
        }
    }
}

impl ClassifyError {
    pub(crate) fn from_ureq(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let message = response.into_string().unwrap_or_default();
                ClassifyError::Status { status, message }
            }
            ureq::Error::Transport(transport) => ClassifyError::Request(transport.to_string()),
        }
    }
}
