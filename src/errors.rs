//! Error taxonomy shared across the pipeline.
//!
//! `PipelineError` carries the stable `code()` used in progress events and
//! run logs (spec §7); `ToolError` is the narrower contract returned by a
//! single tool runner before it gets folded into a `PipelineError`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Stable error code surfaced to observers and persisted in run logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Decode,
    Encode,
    Write,
    Permission,
    Locked,
    Unsupported,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Decode => "E_DECODE",
            ErrorCode::Encode => "E_ENCODE",
            ErrorCode::Write => "E_WRITE",
            ErrorCode::Permission => "E_PERMISSION",
            ErrorCode::Locked => "E_LOCKED",
            ErrorCode::Unsupported => "E_UNSUPPORTED",
            ErrorCode::Unknown => "E_UNKNOWN",
        }
    }

    /// Whether a retry (e.g. the watcher's backoff queue) is worthwhile.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCode::Unknown | ErrorCode::Locked)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, user-facing pipeline failure.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct PipelineError {
    pub code: ErrorCode,
    pub message: String,
    pub path: Option<PathBuf>,
}

impl PipelineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Decode, message)
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Encode, message)
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Write, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unsupported, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

    /// Classify a raw `io::Error` into the permission/locked/unknown buckets.
    pub fn from_io(err: &std::io::Error, context: &str) -> Self {
        use std::io::ErrorKind;
        let code = match err.kind() {
            ErrorKind::PermissionDenied => ErrorCode::Permission,
            ErrorKind::AlreadyExists | ErrorKind::WouldBlock => ErrorCode::Locked,
            _ => ErrorCode::Unknown,
        };
        Self::new(code, format!("{context}: {err}"))
    }
}

/// Narrow error returned by a single tool runner call, before it is folded
/// into a `PipelineError` by the candidate builder.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool binary/library unavailable: {0}")]
    MissingBinary(String),
    #[error("encoder rejected candidate as not worthwhile: {0}")]
    Skip(String),
    #[error("encoder failed: {0}")]
    Failed(String),
}

impl From<ToolError> for PipelineError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::MissingBinary(msg) => PipelineError::new(ErrorCode::Unsupported, msg),
            ToolError::Skip(msg) => PipelineError::new(ErrorCode::Unknown, msg),
            ToolError::Failed(msg) => PipelineError::new(ErrorCode::Encode, msg),
        }
    }
}
