//! Test doubles for transaction collaborators.
//!
//! - [`RecordingHandle`]: a [`WriteHandle`] that records each finalize call
//!   into a shared [`FinalizeLog`], optionally failing.
//! - [`ThreadExecutor`]: a [`RemoteExecutor`] hosting each collector on its
//!   own OS thread, with an optional delay before results resolve.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use vfskit_core::testing::{FinalizeLog, RecordingHandle, ThreadExecutor};
//! use vfskit_core::Transaction;
//!
//! let log = FinalizeLog::new();
//! let mut txn = Transaction::remote(Arc::new(ThreadExecutor::new()));
//! txn.start().unwrap();
//! txn.register(RecordingHandle::shared("part-0.parquet", &log)).unwrap();
//! txn.complete(true).unwrap();
//!
//! assert_eq!(log.events(), ["commit part-0.parquet"]);
//! ```

use crate::error::TransactionError;
use crate::transaction::remote::{CollectorCall, FileCollector, RemoteCollector, RemoteExecutor};
use crate::transaction::WriteHandle;
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Shared, ordered record of finalize calls ("commit a", "discard b", ...).
#[derive(Debug, Clone, Default)]
pub struct FinalizeLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl FinalizeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: String) {
        self.events.lock().push(event);
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

/// A write handle that logs its finalize calls.
#[derive(Debug)]
pub struct RecordingHandle {
    name: String,
    log: FinalizeLog,
    fail: bool,
    calls: AtomicUsize,
}

impl RecordingHandle {
    pub fn new(name: impl Into<String>, log: &FinalizeLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A shared handle that succeeds.
    pub fn shared(name: impl Into<String>, log: &FinalizeLog) -> Arc<Self> {
        Arc::new(Self::new(name, log))
    }

    /// A shared handle whose `commit` and `discard` both fail (after being
    /// logged).
    pub fn failing(name: impl Into<String>, log: &FinalizeLog) -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::new(name, log)
        })
    }

    /// Number of finalize calls this handle received.
    pub fn finalize_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn finalize(&self, action: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.record(format!("{action} {}", self.name));
        if self.fail {
            anyhow::bail!("simulated {action} failure for {}", self.name);
        }
        Ok(())
    }
}

impl WriteHandle for RecordingHandle {
    fn commit(&self) -> anyhow::Result<()> {
        self.finalize("commit")
    }

    fn discard(&self) -> anyhow::Result<()> {
        self.finalize("discard")
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

type CallReply = oneshot::Sender<Result<(), TransactionError>>;

/// Hosts each submitted collector on a dedicated thread.
///
/// Calls are served in the order they were invoked. With a result delay,
/// the worker sleeps after executing a commit or discard and before
/// replying.
#[derive(Debug, Clone, Default)]
pub struct ThreadExecutor {
    result_delay: Duration,
}

impl ThreadExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result_delay(result_delay: Duration) -> Self {
        Self { result_delay }
    }
}

impl RemoteExecutor for ThreadExecutor {
    fn submit(
        &self,
        collector: FileCollector,
    ) -> Result<Box<dyn RemoteCollector>, TransactionError> {
        let (calls, inbox) = mpsc::channel::<(CollectorCall, CallReply)>();
        let delay = self.result_delay;

        thread::Builder::new()
            .name("vfskit-collector".to_string())
            .spawn(move || {
                let mut collector = collector;
                for (call, reply) in inbox {
                    let finalizing = !matches!(call, CollectorCall::Append(_));
                    let result = collector.apply(call);
                    if finalizing && !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    // The caller may have stopped waiting.
                    let _ = reply.send(result);
                }
            })
            .map_err(|e| TransactionError::Remote(e.into()))?;

        Ok(Box::new(ThreadCollector { calls }))
    }
}

struct ThreadCollector {
    calls: mpsc::Sender<(CollectorCall, CallReply)>,
}

impl RemoteCollector for ThreadCollector {
    fn invoke(&self, call: CollectorCall) -> BoxFuture<'static, Result<(), TransactionError>> {
        let (reply, result) = oneshot::channel();
        let sent = self.calls.send((call, reply)).is_ok();
        async move {
            if !sent {
                return Err(TransactionError::Remote(anyhow::anyhow!(
                    "collector thread has exited"
                )));
            }
            result.await.map_err(|_| {
                TransactionError::Remote(anyhow::anyhow!("collector thread dropped the call"))
            })?
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_handle_counts_calls() {
        let log = FinalizeLog::new();
        let handle = RecordingHandle::shared("a", &log);
        handle.commit().unwrap();
        assert_eq!(handle.finalize_calls(), 1);
        assert_eq!(log.events(), ["commit a"]);
    }

    #[test]
    fn test_failing_handle_logs_then_fails() {
        let log = FinalizeLog::new();
        let handle = RecordingHandle::failing("b", &log);
        assert!(handle.discard().is_err());
        assert_eq!(log.events(), ["discard b"]);
    }

    #[test]
    fn test_thread_collector_serves_in_order() {
        let log = FinalizeLog::new();
        let collector = ThreadExecutor::new().submit(FileCollector::new()).unwrap();
        for name in ["x", "y", "z"] {
            drop(collector.invoke(CollectorCall::Append(RecordingHandle::shared(name, &log))));
        }
        futures::executor::block_on(collector.invoke(CollectorCall::Commit)).unwrap();
        assert_eq!(log.events(), ["commit x", "commit y", "commit z"]);
    }
}
