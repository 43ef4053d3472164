//! Error types for the directory cache and transaction coordinator.

use std::fmt;

/// Errors returned by [`DirCache`](crate::DirCache) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The path was never cached, has expired, or fell out of the recency
    /// window. Callers should re-fetch the listing from the backing store.
    #[error("no cached listing for {path}")]
    NotFound {
        /// The requested directory path
        path: String,
    },
}

impl CacheError {
    pub(crate) fn not_found(path: &str) -> Self {
        CacheError::NotFound {
            path: path.to_string(),
        }
    }
}

/// Which finalize call was being made on a write handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinalizeAction {
    /// `commit()`: make the deferred write visible.
    Commit,
    /// `discard()`: drop the deferred write.
    Discard,
}

impl FinalizeAction {
    pub fn from_commit(commit: bool) -> Self {
        if commit {
            FinalizeAction::Commit
        } else {
            FinalizeAction::Discard
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FinalizeAction::Commit => "commit",
            FinalizeAction::Discard => "discard",
        }
    }
}

impl fmt::Display for FinalizeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single write handle that failed to finalize.
#[derive(Debug, thiserror::Error)]
#[error("failed to {action} handle #{index} ({handle}): {source}")]
pub struct FinalizeFailure {
    /// Position of the handle in registration order.
    pub index: usize,
    /// The handle's [`describe`](crate::WriteHandle::describe) label.
    pub handle: String,
    /// The finalize call that failed.
    pub action: FinalizeAction,
    /// The error reported by the handle.
    #[source]
    pub source: anyhow::Error,
}

/// Errors returned by [`Transaction`](crate::Transaction) operations.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// One or more handles failed to finalize. Every registered handle was
    /// still offered exactly one finalize call; `failures` lists each one
    /// that failed, in registration order.
    #[error("{} of {attempted} handle(s) failed to {action}", failures.len())]
    Finalize {
        /// The finalize call that was swept over the handles.
        action: FinalizeAction,
        /// Number of handles that were offered a finalize call.
        attempted: usize,
        /// The individual failures.
        failures: Vec<FinalizeFailure>,
    },

    /// `start()` was called while a transaction is already active.
    #[error("a transaction is already active on this filesystem")]
    AlreadyActive,

    /// A handle was registered, or completion requested, with no active
    /// transaction.
    #[error("no transaction is active on this filesystem")]
    NotActive,

    /// The remote collector could not be reached or did not answer.
    #[error("remote collector failed: {0}")]
    Remote(#[source] anyhow::Error),
}

impl TransactionError {
    /// Returns the individual handle failures, if this is a finalize error.
    pub fn failures(&self) -> &[FinalizeFailure] {
        match self {
            TransactionError::Finalize { failures, .. } => failures,
            _ => &[],
        }
    }
}
