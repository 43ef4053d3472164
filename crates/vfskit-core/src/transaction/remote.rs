//! Finalization delegated to a collector living on a remote worker.
//!
//! When write handles are created on workers (for example by tasks of a
//! distributed job), the coordinating process cannot finalize them itself.
//! Instead it submits a [`FileCollector`] to the worker pool at transaction
//! start, handle creation routes `Append` calls to that collector, and the
//! coordinator asks it to commit or discard at the end.
//!
//! The worker framework is abstracted by two traits:
//!
//! - [`RemoteExecutor::submit`] hosts a collector remotely and returns a
//!   handle to it.
//! - [`RemoteCollector::invoke`] sends one call to the hosted collector. The
//!   call is dispatched immediately; the returned future only resolves its
//!   result.
//!
//! [`RemoteFinalizer::commit`] and [`RemoteFinalizer::discard`] block the
//! calling thread until the remote result is available. No timeout is
//! applied here.

use super::{finalize_all, Finalizer, WriteHandle};
use crate::error::{FinalizeAction, TransactionError};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// A call made on a remote [`FileCollector`].
#[derive(Clone)]
pub enum CollectorCall {
    /// Add a handle to the collector's list.
    Append(Arc<dyn WriteHandle>),
    /// Commit every collected handle, then forget them.
    Commit,
    /// Discard every collected handle, then forget them.
    Discard,
}

impl fmt::Debug for CollectorCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorCall::Append(handle) => {
                f.debug_tuple("Append").field(&handle.describe()).finish()
            }
            CollectorCall::Commit => f.write_str("Commit"),
            CollectorCall::Discard => f.write_str("Discard"),
        }
    }
}

/// Handle to a collector hosted by a [`RemoteExecutor`].
pub trait RemoteCollector: Send + Sync {
    /// Dispatches `call` to the remote collector.
    ///
    /// Must send the call before returning; the future only waits for the
    /// result, so dropping it does not cancel the call.
    fn invoke(&self, call: CollectorCall) -> BoxFuture<'static, Result<(), TransactionError>>;
}

/// A worker pool that can host a [`FileCollector`].
pub trait RemoteExecutor: Send + Sync {
    fn submit(
        &self,
        collector: FileCollector,
    ) -> Result<Box<dyn RemoteCollector>, TransactionError>;
}

/// The object hosted on the worker: an ordered list of handles with
/// commit/discard sweeps.
///
/// Finalization follows the same rules as the local coordinator: every
/// handle is attempted in append order and all failures are reported
/// together.
#[derive(Default)]
pub struct FileCollector {
    files: Vec<Arc<dyn WriteHandle>>,
}

impl FileCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, handle: Arc<dyn WriteHandle>) {
        self.files.push(handle);
    }

    pub fn commit(&mut self) -> Result<(), TransactionError> {
        let files = std::mem::take(&mut self.files);
        finalize_all(&files, FinalizeAction::Commit)
    }

    pub fn discard(&mut self) -> Result<(), TransactionError> {
        let files = std::mem::take(&mut self.files);
        finalize_all(&files, FinalizeAction::Discard)
    }

    /// Executes one [`CollectorCall`]. Executors use this to serve calls.
    pub fn apply(&mut self, call: CollectorCall) -> Result<(), TransactionError> {
        match call {
            CollectorCall::Append(handle) => {
                self.append(handle);
                Ok(())
            }
            CollectorCall::Commit => self.commit(),
            CollectorCall::Discard => self.discard(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl fmt::Debug for FileCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCollector")
            .field("files", &self.files.len())
            .finish()
    }
}

/// Finalizer backed by a remote [`FileCollector`].
pub struct RemoteFinalizer {
    executor: Arc<dyn RemoteExecutor>,
    collector: Option<Box<dyn RemoteCollector>>,
    /// Outstanding `Append` results, checked when the transaction completes.
    appends: Vec<BoxFuture<'static, Result<(), TransactionError>>>,
}

impl RemoteFinalizer {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            collector: None,
            appends: Vec::new(),
        }
    }

    fn finish(&mut self, action: FinalizeAction) -> Result<(), TransactionError> {
        let appends = std::mem::take(&mut self.appends);
        let collector = self.collector.take().ok_or(TransactionError::NotActive)?;
        let call = match action {
            FinalizeAction::Commit => CollectorCall::Commit,
            FinalizeAction::Discard => CollectorCall::Discard,
        };

        tracing::debug!(%action, "Waiting for remote collector");
        futures::executor::block_on(async move {
            let mut lost = 0usize;
            for append in appends {
                if let Err(e) = append.await {
                    tracing::warn!("Handle was not appended to remote collector: {}", e);
                    lost += 1;
                }
            }

            collector.invoke(call).await?;
            if lost > 0 {
                return Err(TransactionError::Remote(anyhow::anyhow!(
                    "{lost} handle(s) never reached the remote collector and were not finalized"
                )));
            }
            Ok(())
        })
    }
}

impl fmt::Debug for RemoteFinalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFinalizer")
            .field("connected", &self.collector.is_some())
            .field("appends", &self.appends.len())
            .finish_non_exhaustive()
    }
}

impl Finalizer for RemoteFinalizer {
    fn begin(&mut self) -> Result<(), TransactionError> {
        self.appends.clear();
        self.collector = Some(self.executor.submit(FileCollector::new())?);
        tracing::debug!("Submitted remote file collector");
        Ok(())
    }

    fn register(&mut self, handle: Arc<dyn WriteHandle>) {
        match self.collector.as_ref() {
            Some(collector) => {
                let append = collector.invoke(CollectorCall::Append(handle));
                self.appends.push(append);
            }
            None => tracing::warn!(
                handle = %handle.describe(),
                "No remote collector; handle will not be finalized"
            ),
        }
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        self.finish(FinalizeAction::Commit)
    }

    fn discard(&mut self) -> Result<(), TransactionError> {
        self.finish(FinalizeAction::Discard)
    }

    /// The authoritative list lives on the worker.
    fn pending(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FinalizeLog, RecordingHandle, ThreadExecutor};
    use crate::Transaction;
    use std::time::{Duration, Instant};

    #[test]
    fn test_file_collector_sweeps_in_order() {
        let log = FinalizeLog::new();
        let mut collector = FileCollector::new();
        collector.append(RecordingHandle::shared("a", &log));
        collector.append(RecordingHandle::failing("b", &log));
        collector.append(RecordingHandle::shared("c", &log));

        let err = collector.commit().unwrap_err();
        assert_eq!(err.failures().len(), 1);
        assert_eq!(log.events(), ["commit a", "commit b", "commit c"]);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_file_collector_apply() {
        let log = FinalizeLog::new();
        let mut collector = FileCollector::new();
        collector
            .apply(CollectorCall::Append(RecordingHandle::shared("a", &log)))
            .unwrap();
        assert_eq!(collector.len(), 1);
        collector.apply(CollectorCall::Discard).unwrap();
        assert_eq!(log.events(), ["discard a"]);
    }

    #[test]
    fn test_remote_commit() {
        let log = FinalizeLog::new();
        let mut txn = Transaction::remote(Arc::new(ThreadExecutor::new()));
        txn.start().unwrap();
        txn.register(RecordingHandle::shared("a", &log)).unwrap();
        txn.register(RecordingHandle::shared("b", &log)).unwrap();
        assert_eq!(txn.pending(), None);

        txn.complete(true).unwrap();
        assert_eq!(log.events(), ["commit a", "commit b"]);
        assert!(!txn.in_transaction());
    }

    #[test]
    fn test_remote_discard() {
        let log = FinalizeLog::new();
        let mut txn = Transaction::remote(Arc::new(ThreadExecutor::new()));
        txn.start().unwrap();
        txn.register(RecordingHandle::shared("a", &log)).unwrap();
        txn.complete(false).unwrap();
        assert_eq!(log.events(), ["discard a"]);
    }

    #[test]
    fn test_remote_complete_blocks_until_result() {
        let log = FinalizeLog::new();
        let delay = Duration::from_millis(100);
        let mut txn = Transaction::remote(Arc::new(ThreadExecutor::with_result_delay(delay)));
        txn.start().unwrap();
        txn.register(RecordingHandle::shared("a", &log)).unwrap();

        let started = Instant::now();
        txn.complete(true).unwrap();
        assert!(started.elapsed() >= delay);
        assert_eq!(log.events(), ["commit a"]);
    }

    #[test]
    fn test_remote_failure_surfaces() {
        let log = FinalizeLog::new();
        let mut txn = Transaction::remote(Arc::new(ThreadExecutor::new()));
        txn.start().unwrap();
        txn.register(RecordingHandle::failing("a", &log)).unwrap();
        txn.register(RecordingHandle::shared("b", &log)).unwrap();

        let err = txn.complete(true).unwrap_err();
        assert_eq!(err.failures().len(), 1);
        assert_eq!(log.events(), ["commit a", "commit b"]);
        assert!(!txn.in_transaction());
    }

    #[test]
    fn test_fresh_collector_per_transaction() {
        let log = FinalizeLog::new();
        let mut txn = Transaction::remote(Arc::new(ThreadExecutor::new()));
        txn.start().unwrap();
        txn.register(RecordingHandle::shared("first", &log)).unwrap();
        txn.complete(true).unwrap();

        txn.start().unwrap();
        txn.register(RecordingHandle::shared("second", &log)).unwrap();
        txn.complete(false).unwrap();

        assert_eq!(log.events(), ["commit first", "discard second"]);
    }
}
