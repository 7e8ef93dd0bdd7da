//! Map-reduce over a worker pool.
//!
//! Global expansion fans per-file work out over a rayon pool owned by the
//! engine. Jobs never share mutable state: each receives one item and returns
//! a value, and every failure is collected rather than dropped.

use crate::error::{Result, SleuthError};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

enum Workers {
    Rayon(rayon::ThreadPool),
    Inline,
}

/// A fixed-size worker pool.
pub struct TaskPool {
    workers: Workers,
    threads: usize,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.workers {
            Workers::Rayon(_) => "rayon",
            Workers::Inline => "inline",
        };
        f.debug_struct("TaskPool")
            .field("workers", &kind)
            .field("threads", &self.threads)
            .finish()
    }
}

impl TaskPool {
    /// Build a pool with `threads` workers.
    ///
    /// Halves the thread count when the OS refuses to spawn threads, and
    /// falls back to running jobs on the calling thread if no worker can be
    /// created at all.
    pub fn new(threads: usize) -> Self {
        let mut threads = threads.max(1);
        loop {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|idx| format!("sleuth-worker-{idx}"))
                .build()
            {
                Ok(pool) => {
                    return Self {
                        workers: Workers::Rayon(pool),
                        threads,
                    }
                }
                Err(err) if threads > 1 => {
                    log::warn!(
                        "failed to start {} workers ({}), retrying with fewer",
                        threads,
                        err
                    );
                    threads = (threads / 2).max(1);
                }
                Err(err) => {
                    log::warn!("no worker threads available ({}), running inline", err);
                    return Self {
                        workers: Workers::Inline,
                        threads: 1,
                    };
                }
            }
        }
    }

    /// Number of workers.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `job` on every item and fold the results with `merge`.
    ///
    /// Items are split into one contiguous chunk per worker. Results are
    /// merged in item order, so the output does not depend on which worker
    /// finishes first.
    ///
    /// # Errors
    /// `PartialFileFailure` listing every item whose job failed; a single
    /// failure fails the whole call.
    pub fn map_reduce<T, R, J, M>(&self, items: &[T], job: J, merge: M, neutral: R) -> Result<R>
    where
        T: AsRef<Path> + Sync,
        R: Send,
        J: Fn(&T) -> Result<R> + Sync,
        M: Fn(R, R) -> R,
    {
        if items.is_empty() {
            return Ok(neutral);
        }
        let chunk_size = items.len().div_ceil(self.threads);

        let run_chunk = |chunk: &[T]| -> Vec<(PathBuf, Result<R>)> {
            chunk
                .iter()
                .map(|item| (item.as_ref().to_path_buf(), job(item)))
                .collect()
        };

        let chunks: Vec<Vec<(PathBuf, Result<R>)>> = match &self.workers {
            Workers::Rayon(pool) => {
                pool.install(|| items.par_chunks(chunk_size).map(run_chunk).collect())
            }
            Workers::Inline => items.chunks(chunk_size).map(run_chunk).collect(),
        };

        let mut failures = Vec::new();
        let mut acc = neutral;
        for (path, result) in chunks.into_iter().flatten() {
            match result {
                Ok(value) => acc = merge(acc, value),
                Err(err) => {
                    log::warn!("job failed for {}: {}", path.display(), err);
                    failures.push((path, err.to_string()));
                }
            }
        }

        if failures.is_empty() {
            Ok(acc)
        } else {
            Err(SleuthError::PartialFileFailure { failures })
        }
    }
}
