//! Error types for the engine's layers.

use std::path::PathBuf;
use thiserror::Error;

use crate::common::{JobId, Location, PartNumber};

/// Failure creating, opening or addressing a durable job-part plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plan file {path} is not a valid job-part plan: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("plan file {path} was written by format version {found}, expected {expected}")]
    Version {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("plan has {count} transfers; too many for one part")]
    TooManyTransfers { count: usize },

    #[error("plan needs more than {max} chunks; split the part or raise the block size")]
    TooManyChunks { max: u64 },

    #[error("transfer index {index} out of range ({count} transfers)")]
    TransferOutOfRange { index: u32, count: u32 },

    #[error("chunk index {index} out of range ({count} chunks)")]
    ChunkOutOfRange { index: u32, count: u32 },
}

impl PlanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PlanError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PlanError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failure translating optional destination attributes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttributeError {
    #[error("{field} is {len} bytes; at most {max} allowed")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("block size {0} exceeds the maximum of {1} bytes")]
    BlockSizeTooLarge(u64, u64),
}

/// Failure of a single job-part submission. Nothing is scheduled when one is returned.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("copy from {source_type} to {destination_type} is not supported")]
    Unsupported {
        source_type: Location,
        destination_type: Location,
    },

    #[error("invalid optional attributes: {0}")]
    Attributes(#[from] AttributeError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("existing plan for job {job_id} part {part} has {existing} transfers, order has {ordered}")]
    PlanMismatch {
        job_id: JobId,
        part: PartNumber,
        existing: u32,
        ordered: usize,
    },

    #[error("transfer queues are closed; engine is shutting down")]
    QueueClosed,
}

/// Failure inside the execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Internal bookkeeping says the job part must exist but the directory has no entry.
    #[error("invariant violated: job {job_id} part {part} missing from the job-part directory")]
    MissingJobPart { job_id: JobId, part: PartNumber },

    /// Internal bookkeeping says the job must exist but the directory has no entry.
    #[error("invariant violated: job {0} missing from the job-part directory")]
    MissingJob(JobId),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("worker thread panicked")]
    WorkerPanicked,

    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Failure reported by the data plane for one chunk or transfer step.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("short read from {path}: expected {expected} bytes, got {received}")]
    ShortRead {
        path: PathBuf,
        expected: u64,
        received: u64,
    },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("blob path {0:?} escapes the blob root")]
    InvalidBlobPath(String),

    #[error("{0} endpoints are not handled by this data plane")]
    UnsupportedLocation(Location),
}

impl TransportError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransportError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
