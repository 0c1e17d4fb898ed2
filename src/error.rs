//! Error taxonomy for the orchestration pipeline

use crate::message::ContentError;
use crate::model::ModelError;
use crate::repository::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the Message Service and its collaborators
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed structured content or request input
    #[error("Validation failed: {0}")]
    Validation(String),
    /// No processor accepts the named tool
    #[error("no processor for {0}")]
    NotFound(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Model client error: {0}")]
    Model(#[from] ModelError),
    /// Wiring problem, e.g. no listener for a required event type
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Validation(_) => ErrorKind::Validation,
            ChatError::NotFound(_) => ErrorKind::NotFound,
            ChatError::Repository(_) | ChatError::Model(_) => ErrorKind::Upstream,
            ChatError::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

impl From<ContentError> for ChatError {
    fn from(e: ContentError) -> Self {
        ChatError::Validation(e.to_string())
    }
}

/// Error classification carried by `error-occurred` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Upstream,
    Configuration,
}

/// Collaborator that receives errors which are reported rather than returned
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &ChatError, context: &str);
}

/// Reports through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &ChatError, context: &str) {
        tracing::error!(
            kind = ?error.kind(),
            context = %context,
            error = %error,
            "Reported error"
        );
    }
}
