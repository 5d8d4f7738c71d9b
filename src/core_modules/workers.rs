// THEORY:
// The `WorkerPool` spreads independent per-sample work (decode, crop, resize,
// equalize) across CPU cores. Every job is a pure function of its input, so the
// only thing the pool must guarantee is ordering: result `i` always belongs to
// input `i`, and the output of a parallel run is byte-identical to a serial one.

use crate::error::PrepResult;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Builds a pool with `workers` threads, or one per logical CPU when `None`.
    pub fn new(workers: Option<usize>) -> PrepResult<Self> {
        let workers = workers.unwrap_or_else(num_cpus::get).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("signprep-worker-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Applies `job` to every item and returns the results in input order.
    /// Stops at the first error.
    pub fn map_ordered<I, O, F>(&self, items: &[I], job: F) -> PrepResult<Vec<O>>
    where
        I: Sync,
        O: Send,
        F: Fn(&I) -> PrepResult<O> + Sync + Send,
    {
        self.pool
            .install(|| items.par_iter().map(|item| job(item)).collect())
    }
}
