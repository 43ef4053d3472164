//! Deferred write transactions.
//!
//! A filesystem layer that supports transactions owns one [`Transaction`]
//! slot. While the slot is active, every file opened for writing registers
//! its [`WriteHandle`] instead of finalizing on close; when the transaction
//! completes, all registered handles are committed, or all discarded, in one
//! pass.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start()--> Active --complete(commit)--> Idle
//! ```
//!
//! `complete` always returns the slot to `Idle` with no registered handles,
//! even when some handles fail to finalize. There is no cross-handle
//! atomicity: after a failed commit some files may be committed and others
//! not, but every registered handle was offered exactly one finalize call.
//!
//! # Finalizers
//!
//! Where the handles live is abstracted by [`Finalizer`]:
//!
//! - [`LocalFinalizer`] keeps them in-process.
//! - [`RemoteFinalizer`] delegates to a collector object on a remote worker
//!   and blocks on its result when completing.
//!
//! # Example
//!
//! ```
//! use vfskit_core::testing::{FinalizeLog, RecordingHandle};
//! use vfskit_core::Transaction;
//!
//! let log = FinalizeLog::new();
//! let mut txn = Transaction::local();
//!
//! txn.run(|scope| {
//!     scope.register(RecordingHandle::shared("a.csv", &log));
//!     scope.register(RecordingHandle::shared("b.csv", &log));
//!     Ok::<_, std::io::Error>(())
//! })
//! .unwrap();
//!
//! assert_eq!(log.events(), ["commit a.csv", "commit b.csv"]);
//! assert!(!txn.in_transaction());
//! ```

mod local;
pub mod remote;

pub use local::LocalFinalizer;
pub use remote::RemoteFinalizer;

use crate::error::{FinalizeAction, FinalizeFailure, TransactionError};
use std::fmt;
use std::sync::Arc;

/// An in-progress write owned by a backend, finalized by the transaction.
///
/// The transaction calls exactly one of `commit` or `discard`, exactly once,
/// per transaction the handle was registered in. Implementations use interior
/// mutability; the transaction only holds a shared reference.
pub trait WriteHandle: Send + Sync {
    /// Make the deferred write visible in the backing store.
    fn commit(&self) -> anyhow::Result<()>;

    /// Abandon the deferred write.
    fn discard(&self) -> anyhow::Result<()>;

    /// Short label for logs and failure reports, usually the target path.
    fn describe(&self) -> String {
        String::from("write handle")
    }
}

/// Where registered handles are collected and how they are finalized.
///
/// Chosen once when the [`Transaction`] is constructed.
pub trait Finalizer: Send + fmt::Debug {
    /// Prepares for a new transaction, dropping anything left over.
    fn begin(&mut self) -> Result<(), TransactionError>;

    /// Adds a handle to the current transaction. Must not block.
    fn register(&mut self, handle: Arc<dyn WriteHandle>);

    /// Commits every registered handle and forgets them.
    fn commit(&mut self) -> Result<(), TransactionError>;

    /// Discards every registered handle and forgets them.
    fn discard(&mut self) -> Result<(), TransactionError>;

    /// Number of handles awaiting finalization, if known locally.
    fn pending(&self) -> Option<usize>;
}

/// Offers `action` to every handle in order, collecting failures.
///
/// A failing handle does not stop the sweep. All failures are returned
/// together as [`TransactionError::Finalize`].
pub(crate) fn finalize_all(
    handles: &[Arc<dyn WriteHandle>],
    action: FinalizeAction,
) -> Result<(), TransactionError> {
    let mut failures = Vec::new();
    for (index, handle) in handles.iter().enumerate() {
        let result = match action {
            FinalizeAction::Commit => handle.commit(),
            FinalizeAction::Discard => handle.discard(),
        };
        if let Err(source) = result {
            let failure = FinalizeFailure {
                index,
                handle: handle.describe(),
                action,
                source,
            };
            tracing::warn!("{}", failure);
            failures.push(failure);
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(TransactionError::Finalize {
            action,
            attempted: handles.len(),
            failures,
        })
    }
}

/// Whether the owning filesystem is inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    /// `id` increases with every transaction started on the slot.
    Active { id: u64 },
}

/// Per-filesystem transaction slot.
///
/// Each filesystem instance owns one of these. It is single-owner like the
/// rest of the filesystem state; wrap the filesystem in a lock to share it.
#[derive(Debug)]
pub struct Transaction {
    finalizer: Box<dyn Finalizer>,
    state: TransactionState,
    next_id: u64,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::local()
    }
}

impl Transaction {
    /// A slot whose handles are finalized in this process.
    pub fn local() -> Self {
        Self::with_finalizer(Box::new(LocalFinalizer::new()))
    }

    /// A slot whose handles are collected and finalized on a remote worker.
    pub fn remote(executor: Arc<dyn remote::RemoteExecutor>) -> Self {
        Self::with_finalizer(Box::new(RemoteFinalizer::new(executor)))
    }

    pub fn with_finalizer(finalizer: Box<dyn Finalizer>) -> Self {
        Self {
            finalizer,
            state: TransactionState::Idle,
            next_id: 1,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// True while a transaction is active on this slot.
    pub fn in_transaction(&self) -> bool {
        matches!(self.state, TransactionState::Active { .. })
    }

    /// Number of handles awaiting finalization, if known locally.
    pub fn pending(&self) -> Option<usize> {
        self.finalizer.pending()
    }

    /// Starts a transaction, returning its id.
    pub fn start(&mut self) -> Result<u64, TransactionError> {
        if self.in_transaction() {
            return Err(TransactionError::AlreadyActive);
        }
        self.finalizer.begin()?;
        let id = self.next_id;
        self.next_id += 1;
        self.state = TransactionState::Active { id };
        tracing::debug!(id, "Transaction started");
        Ok(id)
    }

    /// Registers a write handle with the active transaction.
    ///
    /// Fails with [`TransactionError::NotActive`] outside a transaction; the
    /// handle is not retained in that case.
    pub fn register(&mut self, handle: Arc<dyn WriteHandle>) -> Result<(), TransactionError> {
        let TransactionState::Active { id } = self.state else {
            return Err(TransactionError::NotActive);
        };
        tracing::trace!(id, handle = %handle.describe(), "Registering write handle");
        self.finalizer.register(handle);
        Ok(())
    }

    /// Commits (`commit = true`) or discards every registered handle and
    /// returns the slot to [`TransactionState::Idle`].
    ///
    /// The slot is idle afterwards whatever the outcome.
    pub fn complete(&mut self, commit: bool) -> Result<(), TransactionError> {
        let TransactionState::Active { id } = self.state else {
            return Err(TransactionError::NotActive);
        };
        let action = FinalizeAction::from_commit(commit);
        tracing::debug!(id, %action, pending = ?self.finalizer.pending(), "Completing transaction");

        self.state = TransactionState::Idle;
        let result = if commit {
            self.finalizer.commit()
        } else {
            self.finalizer.discard()
        };

        match &result {
            Ok(()) => tracing::debug!(id, %action, "Transaction complete"),
            Err(e) => tracing::warn!(id, %action, "Transaction completed with errors: {}", e),
        }
        result
    }

    /// Starts a transaction and returns a guard for it.
    ///
    /// Finish the guard with [`TransactionScope::commit`]. A guard dropped
    /// unfinished (early return, `?`, panic) discards.
    pub fn scope(&mut self) -> Result<TransactionScope<'_>, TransactionError> {
        self.start()?;
        Ok(TransactionScope {
            txn: self,
            finished: false,
        })
    }

    /// Runs `body` inside a transaction.
    ///
    /// Commits if `body` returns `Ok`, discards if it returns `Err` or
    /// panics. A discard failure after a failing body is logged and the body's
    /// error is returned.
    pub fn run<T, E, F>(&mut self, body: F) -> Result<T, ScopeError<E>>
    where
        F: FnOnce(&mut TransactionScope<'_>) -> Result<T, E>,
    {
        let mut scope = self.scope()?;
        match body(&mut scope) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(discard_err) = scope.discard() {
                    tracing::warn!(
                        "Discard after failed transaction body also failed: {}",
                        discard_err
                    );
                }
                Err(ScopeError::Body(err))
            }
        }
    }
}

/// Guard over an active transaction. See [`Transaction::scope`].
#[derive(Debug)]
pub struct TransactionScope<'a> {
    txn: &'a mut Transaction,
    finished: bool,
}

impl TransactionScope<'_> {
    /// Id of the transaction this guard covers.
    pub fn id(&self) -> u64 {
        match self.txn.state {
            TransactionState::Active { id } => id,
            TransactionState::Idle => 0,
        }
    }

    /// Registers a write handle. Always accepted: the guard keeps the
    /// transaction active.
    pub fn register(&mut self, handle: Arc<dyn WriteHandle>) {
        tracing::trace!(id = self.id(), handle = %handle.describe(), "Registering write handle");
        self.txn.finalizer.register(handle);
    }

    pub fn pending(&self) -> Option<usize> {
        self.txn.pending()
    }

    pub fn commit(mut self) -> Result<(), TransactionError> {
        self.finished = true;
        self.txn.complete(true)
    }

    pub fn discard(mut self) -> Result<(), TransactionError> {
        self.finished = true;
        self.txn.complete(false)
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() {
            tracing::warn!(id = self.id(), "Discarding transaction during panic");
        } else {
            tracing::debug!(id = self.id(), "Discarding unfinished transaction scope");
        }
        if let Err(e) = self.txn.complete(false) {
            tracing::warn!("Discarding unfinished transaction failed: {}", e);
        }
    }
}

/// Failure of a [`Transaction::run`] block.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError<E> {
    /// The body returned an error; the transaction was discarded.
    #[error("transaction body failed: {0}")]
    Body(E),
    /// Starting or committing the transaction failed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}
