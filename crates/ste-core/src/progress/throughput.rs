//! Process-wide byte counter sampled by status queries.
//!
//! Workers add to an atomic counter after each successful chunk. A query
//! takes the delta against the last snapshot and advances the snapshot, so
//! each query reports only bytes moved since the previous one.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Snapshot {
    bytes: u64,
    at: Instant,
}

#[derive(Debug)]
pub struct ThroughputState {
    current_bytes: AtomicU64,
    last: Mutex<Snapshot>,
}

/// Bytes moved between two samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThroughputSample {
    pub bytes: u64,
    pub elapsed_secs: f64,
    pub bytes_per_sec: f64,
}

impl ThroughputSample {
    fn new(bytes: u64, elapsed: Duration) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let bytes_per_sec = if bytes == 0 || elapsed_secs <= 0.0 {
            0.0
        } else {
            bytes as f64 / elapsed_secs
        };
        Self {
            bytes,
            elapsed_secs,
            bytes_per_sec,
        }
    }
}

impl Default for ThroughputState {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputState {
    pub fn new() -> Self {
        Self {
            current_bytes: AtomicU64::new(0),
            last: Mutex::new(Snapshot {
                bytes: 0,
                at: Instant::now(),
            }),
        }
    }

    /// Record `bytes` more bytes transferred.
    pub fn update_throughput_counter(&self, bytes: u64) {
        self.current_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes transferred since the process started.
    pub fn current_bytes(&self) -> u64 {
        self.current_bytes.load(Ordering::Relaxed)
    }

    /// Delta since the previous sample; advances the snapshot.
    pub fn sample(&self) -> ThroughputSample {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let current = self.current_bytes();
        let sample = ThroughputSample::new(
            current.saturating_sub(last.bytes),
            now.saturating_duration_since(last.at),
        );
        *last = Snapshot {
            bytes: current,
            at: now,
        };
        sample
    }
}
