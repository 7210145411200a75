//! Execution engine: a pool of OS-thread workers draining the channel fabric.
//!
//! The pool only shrinks: each scale-down token sent on the control queue
//! makes exactly one worker leave its loop. A worker that hits an internal
//! invariant violation stops with an error, which `shutdown` reports.

mod worker;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::channels::{ControlChannel, EngineChannels};
use crate::error::EngineError;
use crate::progress::ThroughputState;
use crate::transport::DataPlane;

use worker::WorkerContext;

#[derive(Debug, Default)]
struct PoolCounters {
    /// Workers still inside their loop.
    live: AtomicUsize,
    /// Scale-down tokens sent but not yet consumed.
    exits_requested: AtomicUsize,
}

pub struct ExecutionEngine {
    control: ControlChannel,
    counters: Arc<PoolCounters>,
    workers: Mutex<Vec<(usize, JoinHandle<Result<(), EngineError>>)>>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("live_workers", &self.live_workers())
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Spawn `worker_count` workers (at least one).
    pub fn start(
        worker_count: usize,
        channels: EngineChannels,
        control: ControlChannel,
        data_plane: Arc<dyn DataPlane>,
        throughput: Arc<ThroughputState>,
    ) -> Result<Self, EngineError> {
        let counters = Arc::new(PoolCounters::default());
        let engine = ExecutionEngine {
            control,
            counters: Arc::clone(&counters),
            workers: Mutex::new(Vec::new()),
        };
        for id in 0..worker_count.max(1) {
            let ctx = WorkerContext {
                id,
                channels: channels.clone(),
                data_plane: Arc::clone(&data_plane),
                throughput: Arc::clone(&throughput),
            };
            let thread_counters = Arc::clone(&counters);
            counters.live.fetch_add(1, Ordering::AcqRel);
            let spawned = std::thread::Builder::new()
                .name(format!("ste-worker-{id}"))
                .spawn(move || {
                    let result = ctx.run();
                    // `live` drops before the token is released so scale_down never over-counts.
                    thread_counters.live.fetch_sub(1, Ordering::AcqRel);
                    if result.is_ok() {
                        let _ = thread_counters.exits_requested.fetch_update(
                            Ordering::AcqRel,
                            Ordering::Acquire,
                            |n| n.checked_sub(1),
                        );
                    }
                    result
                });
            match spawned {
                Ok(handle) => engine.lock_workers().push((id, handle)),
                Err(e) => {
                    counters.live.fetch_sub(1, Ordering::AcqRel);
                    // Stop the workers already running before reporting.
                    let _ = engine.shutdown();
                    return Err(EngineError::Spawn(e));
                }
            }
        }
        tracing::info!(workers = worker_count.max(1), "execution engine started");
        Ok(engine)
    }

    /// Workers currently running their loop.
    pub fn live_workers(&self) -> usize {
        self.counters.live.load(Ordering::Acquire)
    }

    /// Ask up to `n` running workers to exit. Returns the number of tokens sent.
    pub fn scale_down(&self, n: usize) -> usize {
        let available = self
            .live_workers()
            .saturating_sub(self.counters.exits_requested.load(Ordering::Acquire));
        let mut sent = 0;
        for _ in 0..n.min(available) {
            if self.control.send_suicide().is_err() {
                break;
            }
            self.counters.exits_requested.fetch_add(1, Ordering::AcqRel);
            sent += 1;
        }
        tracing::info!(requested = n, sent, "scaling down worker pool");
        sent
    }

    /// Stop every worker and wait for them. Returns the first worker failure, if any.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.scale_down(usize::MAX);
        let handles = std::mem::take(&mut *self.lock_workers());
        let mut first_err = None;
        for (id, handle) in handles {
            let result = handle.join().unwrap_or(Err(EngineError::WorkerPanicked));
            if let Err(e) = result {
                tracing::error!(worker = id, "worker stopped with error: {}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn lock_workers(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<(usize, JoinHandle<Result<(), EngineError>>)>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests;
