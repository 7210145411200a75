//! Data-plane seam: the engine decides what to move, a [`DataPlane`] moves it.
//!
//! Workers call `prepare_transfer` once per dispatch of a transfer,
//! `transfer_chunk` once per chunk (possibly from several threads at once for
//! the same transfer), then `finish_transfer` exactly once after the last
//! chunk resolved.

mod fs;

pub use fs::FsDataPlane;

use tokio_util::sync::CancellationToken;

use crate::checksum::ContentTag;
use crate::chunking::ChunkRange;
use crate::common::{JobId, Location, PartNumber};
use crate::error::TransportError;

/// One transfer as seen by the data plane.
#[derive(Debug, Clone, Copy)]
pub struct TransferWork<'a> {
    pub job_id: JobId,
    pub part_num: PartNumber,
    pub transfer_index: u32,
    pub source_type: Location,
    pub destination_type: Location,
    pub source: &'a str,
    pub destination: &'a str,
    pub source_size: u64,
    /// Some chunks were already complete in the plan when this dispatch began.
    pub has_progress: bool,
    pub cancel: &'a CancellationToken,
}

/// One chunk of a transfer.
#[derive(Debug, Clone, Copy)]
pub struct ChunkWork<'a> {
    pub transfer: TransferWork<'a>,
    pub chunk_index: u32,
    pub range: ChunkRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOutcome {
    /// Destination state from an earlier dispatch was kept, so chunks already
    /// marked complete need not be redone.
    pub resumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub bytes: u64,
    pub tag: ContentTag,
}

/// Performs the I/O of transfers on behalf of the execution engine.
pub trait DataPlane: Send + Sync + 'static {
    fn prepare_transfer(&self, work: &TransferWork<'_>) -> Result<PrepareOutcome, TransportError>;

    fn transfer_chunk(&self, work: &ChunkWork<'_>) -> Result<ChunkOutcome, TransportError>;

    /// `succeeded` is false when any chunk failed.
    fn finish_transfer(&self, work: &TransferWork<'_>, succeeded: bool)
        -> Result<(), TransportError>;
}
