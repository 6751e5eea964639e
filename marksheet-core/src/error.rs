use crate::types::MediaType;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single recognition backend. Always recoverable by
/// falling back to the next backend in the chain.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend is not configured: {0}")]
    NotConfigured(String),

    #[error("media type {0} is not supported by this backend")]
    Unsupported(MediaType),

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("no text was recognized")]
    EmptyText,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One failed backend attempt, kept for the failure report
#[derive(Debug)]
pub struct BackendAttempt {
    pub backend: String,
    pub error: BackendError,
}

impl std::fmt::Display for BackendAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.backend, self.error)
    }
}

/// Whole-pipeline failure reported to the caller. Carries no partial record.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("could not read uploaded file {path}: {source}")]
    UnreadableUpload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no backend could extract the marksheet ({})", format_attempts(.attempts))]
    AllBackendsFailed { attempts: Vec<BackendAttempt> },
}

fn format_attempts(attempts: &[BackendAttempt]) -> String {
    if attempts.is_empty() {
        return "no backend available".to_string();
    }
    attempts
        .iter()
        .map(|attempt| attempt.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ExtractionError {
    /// Message suitable for showing to the person reviewing the upload
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedMediaType(media) => format!(
                "Files of type '{media}' cannot be scanned. Upload an image or PDF, or enter the marks manually."
            ),
            Self::UnreadableUpload { .. } | Self::AllBackendsFailed { .. } => {
                "The marksheet could not be read. Please try again with a clearer scan, or fill in the form manually."
                    .to_string()
            }
        }
    }
}
