//! Pipeline-level error surfaced to the administrative caller

use serde::Serialize;
use thiserror::Error;

use crate::ports::StoreError;
use crate::publication::TransitionError;

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or upstream failure; the attempt is retry-eligible
    Transient,
    /// Missing or invalid configuration; nothing was recorded
    Config,
    /// The request would break a state-machine invariant; nothing reached the network
    InvariantViolation,
    /// The platform accepted the post but local state could not be fully updated
    PartialSuccess,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Config => "config",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::PartialSuccess => "partial_success",
        }
    }
}

/// Failure of a tracker operation
///
/// Always carries the attempt count and whether the maximum has been
/// reached so the UI can distinguish "retry" from "give up".
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
    pub max_reached: bool,
    /// Set when a post already exists on the platform
    pub external_url: Option<String>,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: 0,
            max_reached: false,
            external_url: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvariantViolation, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn partial_success(message: impl Into<String>, external_url: impl Into<String>) -> Self {
        Self {
            external_url: Some(external_url.into()),
            ..Self::new(ErrorKind::PartialSuccess, message)
        }
    }

    pub fn with_attempts(mut self, attempts: u32, max_reached: bool) -> Self {
        self.attempts = attempts;
        self.max_reached = max_reached;
        self
    }

    pub fn with_external_url(mut self, url: Option<String>) -> Self {
        self.external_url = url;
        self
    }

    pub fn from_store(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(detail) => Self::invariant(format!(
                "Another publish attempt changed this record concurrently: {}",
                detail
            )),
            StoreError::NotFound(what) => Self::invariant(format!("Not found: {}", what)),
            other => Self::transient(format!("Storage error: {}", other)),
        }
    }

    pub fn from_transition(error: TransitionError) -> Self {
        match error {
            TransitionError::MaxAttemptsReached { attempts, .. } => Self::transient(format!(
                "{}; a manual retry is required",
                error
            ))
            .with_attempts(attempts, true),
            other => Self::invariant(other.to_string()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient && !self.max_reached
    }
}
