//! Common test utilities for vfskit-core integration tests.

#![allow(dead_code)]

pub mod memory_fs;

pub use memory_fs::MemoryFs;

/// Installs a tracing subscriber honouring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
