//! Fixed-size worker pool shared by integration and meshing.

use rayon::{ThreadPool, ThreadPoolBuilder};
use voxfuse_types::FusionError;

/// A dedicated rayon pool. Work submitted through [`install`][Self::install]
/// runs its parallel iterators on this pool instead of the global one.
#[derive(Debug)]
pub struct FusionScheduler {
    pool: ThreadPool,
}

impl FusionScheduler {
    /// Build a pool with `threads` workers; `0` picks one per core.
    pub fn new(threads: usize) -> Result<Self, FusionError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("voxfuse-worker-{i}"))
            .build()
            .map_err(|e| FusionError::InvalidConfig(format!("worker pool: {e}")))?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` inside the pool and wait for it.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}
