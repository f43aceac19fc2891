//! Intake workflow error types.

use thiserror::Error;

use crate::db::StoreError;

/// Domain conflicts in the reception lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictKind {
    #[error("reception already in progress")]
    AlreadyOpen,

    #[error("reception already closed")]
    AlreadyClosed,

    #[error("no active reception")]
    NoActiveReception,

    #[error("no products to delete")]
    Empty,
}

/// Errors returned by [`super::IntakeWorkflow`] operations.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Malformed or out-of-vocabulary input.
    #[error("{0}")]
    Validation(String),

    /// The requested transition is not allowed in the current state.
    #[error("{0}")]
    Conflict(ConflictKind),

    /// The store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl IntakeError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<ConflictKind> for IntakeError {
    fn from(kind: ConflictKind) -> Self {
        Self::Conflict(kind)
    }
}
