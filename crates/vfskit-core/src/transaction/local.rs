//! In-process finalizer: keeps the registered handles in a local list.

use super::{finalize_all, Finalizer, WriteHandle};
use crate::error::{FinalizeAction, TransactionError};
use std::fmt;
use std::sync::Arc;

/// Finalizer that holds registered handles in the coordinating process and
/// finalizes them itself, strictly in registration order.
#[derive(Default)]
pub struct LocalFinalizer {
    handles: Vec<Arc<dyn WriteHandle>>,
}

impl LocalFinalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(&mut self, action: FinalizeAction) -> Result<(), TransactionError> {
        // Taken before the sweep so the list is empty even if a handle panics.
        let handles = std::mem::take(&mut self.handles);
        finalize_all(&handles, action)
    }
}

impl fmt::Debug for LocalFinalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFinalizer")
            .field("pending", &self.handles.len())
            .finish()
    }
}

impl Finalizer for LocalFinalizer {
    fn begin(&mut self) -> Result<(), TransactionError> {
        // Leftovers from a previous completion that never ran.
        self.handles.clear();
        Ok(())
    }

    fn register(&mut self, handle: Arc<dyn WriteHandle>) {
        self.handles.push(handle);
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        self.finish(FinalizeAction::Commit)
    }

    fn discard(&mut self) -> Result<(), TransactionError> {
        self.finish(FinalizeAction::Discard)
    }

    fn pending(&self) -> Option<usize> {
        Some(self.handles.len())
    }
}
