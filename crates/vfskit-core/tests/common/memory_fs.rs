//! A minimal in-memory filesystem wired the way a real backend layer uses
//! the listing cache and the transaction slot.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use vfskit_core::{DirCache, DirCacheConfig, Entry, Listing, Transaction, WriteHandle};

type Files = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Filesystem with a listing cache and one transaction slot.
pub struct MemoryFs {
    files: Files,
    pub dircache: DirCache,
    pub transaction: Transaction,
    /// Number of times a directory was enumerated from the store.
    pub enumerations: usize,
}

impl MemoryFs {
    pub fn new(config: DirCacheConfig) -> Self {
        Self::with_transaction(config, Transaction::local())
    }

    pub fn with_transaction(config: DirCacheConfig, transaction: Transaction) -> Self {
        Self {
            files: Arc::default(),
            dircache: DirCache::new(config),
            transaction,
            enumerations: 0,
        }
    }

    /// Lists `dir`, serving from the cache when possible.
    pub fn ls(&mut self, dir: &str) -> Listing {
        if let Ok(listing) = self.dircache.get(dir) {
            return listing.clone();
        }
        self.enumerations += 1;
        let listing: Listing = self
            .files
            .lock()
            .iter()
            .filter(|(path, _)| parent(path) == dir)
            .map(|(path, data)| Entry::file(path.clone(), data.len() as u64))
            .collect();
        self.dircache.set(dir, listing.clone());
        listing
    }

    /// Opens a deferred write. Inside a transaction the handle is registered
    /// and finalized later; otherwise it is committed immediately.
    pub fn write(&mut self, path: &str, data: &[u8]) -> anyhow::Result<Arc<MemoryWrite>> {
        let handle = Arc::new(MemoryWrite {
            path: path.to_string(),
            staged: Mutex::new(Some(data.to_vec())),
            files: Arc::clone(&self.files),
        });
        if self.transaction.in_transaction() {
            self.transaction.register(handle.clone())?;
        } else {
            handle.commit()?;
        }
        let _ = self.dircache.delete(parent(path));
        Ok(handle)
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }
}

/// A staged write against [`MemoryFs`].
pub struct MemoryWrite {
    path: String,
    staged: Mutex<Option<Vec<u8>>>,
    files: Files,
}

impl MemoryWrite {
    pub fn is_finalized(&self) -> bool {
        self.staged.lock().is_none()
    }
}

impl WriteHandle for MemoryWrite {
    fn commit(&self) -> anyhow::Result<()> {
        let data = self
            .staged
            .lock()
            .take()
            .ok_or_else(|| anyhow::anyhow!("{} already finalized", self.path))?;
        self.files.lock().insert(self.path.clone(), data);
        Ok(())
    }

    fn discard(&self) -> anyhow::Result<()> {
        self.staged
            .lock()
            .take()
            .map(drop)
            .ok_or_else(|| anyhow::anyhow!("{} already finalized", self.path))
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}
