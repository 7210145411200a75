//! Durable job-part plans: one memory-mapped file per (job, part).
//!
//! A plan holds the part's header, its transfer table and the per-chunk
//! completion state. It is both the execution ledger the workers update and
//! the source of truth read back after a restart.
//!
//! Concurrency: header and transfer paths are write-once and decoded into
//! memory at open. Transfer status, the outstanding-chunk counter and chunk
//! entries live in the mapping and are only touched through atomics, so
//! updates to different chunks never interfere. Two writers of the same
//! chunk are last-writer-wins; the engine hands each chunk to one worker.

mod blob_data;
mod file_name;
mod layout;


pub use blob_data::{
    DestinationBlobData, MAX_BLOCK_SIZE_BYTES, MAX_CONTENT_ENCODING_BYTES, MAX_CONTENT_TYPE_BYTES,
    MAX_METADATA_BYTES,
};
pub use file_name::{parse_plan_file_name, plan_file_name, plan_file_path};
pub use layout::{PlanHeader, MAX_CHUNKS_PER_PART, PLAN_VERSION};

use memmap2::MmapMut;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::checksum::{ContentTag, TAG_LEN};
use crate::chunking::{self, ChunkRange};
use crate::common::{ChunkStatus, CopyJobPartOrder, TransferStatus};
use crate::error::PlanError;
use layout::{TransferEntry, CHUNK_ENTRY_SIZE, C_STATUS, C_TAG, T_OUTSTANDING, T_STATUS};

/// Content tag and status of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub tag: ContentTag,
    pub status: ChunkStatus,
}

/// Handle to one mapped job-part plan.
pub struct JobPartPlan {
    path: PathBuf,
    mmap: MmapMut,
    base: NonNull<u8>,
    len: usize,
    header: PlanHeader,
    transfers: Vec<TransferEntry>,
    /// In-memory dispatch ownership; reset on every open so recovered
    /// transfers can be driven again by a new order.
    claimed: Vec<AtomicBool>,
}

// SAFETY: `base` points into `mmap`, which lives as long as the plan. After
// construction the mapping is only mutated through atomic views, and the
// immutable regions are never read through the mapping again.
unsafe impl Send for JobPartPlan {}
unsafe impl Sync for JobPartPlan {}

impl JobPartPlan {
    /// Create a new plan file at `path` for `order` and map it.
    ///
    /// The file is written to a temp file in the same directory and renamed
    /// into place, so a crash never leaves a half-written plan under the
    /// final name.
    pub fn create(
        path: &Path,
        order: &CopyJobPartOrder,
        blob_data: &DestinationBlobData,
        default_block_size: u64,
    ) -> Result<Self, PlanError> {
        let block_size = if blob_data.block_size > 0 {
            blob_data.block_size
        } else {
            default_block_size
        };
        let bytes = layout::encode_plan(order, blob_data, block_size)?;

        let dir = path
            .parent()
            .ok_or_else(|| PlanError::format(path, "plan path has no parent directory"))?;
        std::fs::create_dir_all(dir).map_err(|e| PlanError::io(dir, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PlanError::io(dir, e))?;
        tmp.write_all(&bytes).map_err(|e| PlanError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| PlanError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| PlanError::io(path, e.error))?;

        tracing::debug!(
            path = %path.display(),
            transfers = order.transfers.len(),
            block_size,
            "created job-part plan"
        );
        Self::open(path)
    }

    /// Map an existing plan file. On-disk state is taken as is.
    pub fn open(path: &Path) -> Result<Self, PlanError> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| PlanError::io(path, e))?;
        // SAFETY: plan files are private to this process; nothing else truncates them while mapped.
        let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| PlanError::io(path, e))?;
        let (header, transfers) = layout::decode_plan(path, &mmap)?;
        let len = mmap.len();
        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| PlanError::format(path, "empty mapping"))?;
        let claimed = (0..transfers.len()).map(|_| AtomicBool::new(false)).collect();
        Ok(JobPartPlan {
            path: path.to_path_buf(),
            mmap,
            base,
            len,
            header,
            transfers,
            claimed,
        })
    }

    /// Open the plan at `path` if it exists, otherwise create it.
    pub fn create_or_open(
        path: &Path,
        order: &CopyJobPartOrder,
        blob_data: &DestinationBlobData,
        default_block_size: u64,
    ) -> Result<Self, PlanError> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path, order, blob_data, default_block_size)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &PlanHeader {
        &self.header
    }

    pub fn num_transfers(&self) -> u32 {
        self.header.num_transfers
    }

    pub fn is_final_part(&self) -> bool {
        self.header.is_final_part
    }

    /// View of transfer `index`.
    ///
    /// # Panics
    /// If `index >= num_transfers()`. Callers bound-check against the header.
    pub fn transfer(&self, index: u32) -> TransferView<'_> {
        assert!(
            index < self.num_transfers(),
            "transfer index {index} out of range ({} transfers)",
            self.num_transfers()
        );
        TransferView { plan: self, index }
    }

    /// Checked variant of [`JobPartPlan::transfer`].
    pub fn try_transfer(&self, index: u32) -> Result<TransferView<'_>, PlanError> {
        self.entry(index)?;
        Ok(TransferView { plan: self, index })
    }

    /// Source and destination of transfer `index`.
    pub fn transfer_source_destination(&self, index: u32) -> Result<(&str, &str), PlanError> {
        let entry = self.entry(index)?;
        Ok((&entry.source, &entry.destination))
    }

    /// Record the outcome of one chunk.
    pub fn update_chunk_info(
        &self,
        transfer: u32,
        chunk: u32,
        tag: ContentTag,
        status: ChunkStatus,
    ) -> Result<(), PlanError> {
        let off = self.chunk_offset(transfer, chunk)?;
        for (slot, byte) in self.atomic_bytes(off + C_TAG, TAG_LEN).iter().zip(tag.0) {
            slot.store(byte, Ordering::Relaxed);
        }
        self.atomic_u8(off + C_STATUS)
            .store(status.as_u8(), Ordering::Release);
        Ok(())
    }

    /// Current content tag and status of one chunk.
    pub fn chunk_info(&self, transfer: u32, chunk: u32) -> Result<ChunkInfo, PlanError> {
        let off = self.chunk_offset(transfer, chunk)?;
        let status = ChunkStatus::from_u8(self.atomic_u8(off + C_STATUS).load(Ordering::Acquire));
        let mut tag = [0u8; TAG_LEN];
        for (b, slot) in tag.iter_mut().zip(self.atomic_bytes(off + C_TAG, TAG_LEN)) {
            *b = slot.load(Ordering::Relaxed);
        }
        Ok(ChunkInfo {
            tag: ContentTag(tag),
            status,
        })
    }

    pub fn set_transfer_status(&self, index: u32, status: TransferStatus) -> Result<(), PlanError> {
        let entry = self.entry(index)?;
        self.atomic_u8(entry.record_offset + T_STATUS)
            .store(status.as_u8(), Ordering::Release);
        Ok(())
    }

    /// Byte range of chunk `chunk` of transfer `transfer`.
    pub fn chunk_range(&self, transfer: u32, chunk: u32) -> Result<ChunkRange, PlanError> {
        let entry = self.entry(transfer)?;
        if chunk >= entry.num_chunks {
            return Err(PlanError::ChunkOutOfRange {
                index: chunk,
                count: entry.num_chunks,
            });
        }
        Ok(chunking::chunk_range(
            entry.source_size,
            self.header.block_size,
            u64::from(chunk),
        ))
    }

    /// Take dispatch ownership of a transfer. Returns false if another
    /// dispatch of the same transfer already owns it in this process.
    pub(crate) fn claim_transfer(&self, index: u32) -> bool {
        self.claimed
            .get(index as usize)
            .map(|c| !c.swap(true, Ordering::AcqRel))
            .unwrap_or(false)
    }

    /// Set the number of chunks that must resolve before the transfer rolls up.
    pub(crate) fn reset_outstanding(&self, index: u32, outstanding: u32) -> Result<(), PlanError> {
        let entry = self.entry(index)?;
        self.atomic_u32(entry.record_offset + T_OUTSTANDING)
            .store(outstanding, Ordering::Release);
        Ok(())
    }

    /// Mark one chunk of the transfer resolved. Returns true for exactly one
    /// caller: the one resolving the last outstanding chunk.
    pub(crate) fn release_chunk(&self, index: u32) -> Result<bool, PlanError> {
        let entry = self.entry(index)?;
        let prev = self
            .atomic_u32(entry.record_offset + T_OUTSTANDING)
            .fetch_sub(1, Ordering::AcqRel);
        Ok(prev == 1)
    }

    /// Schedule dirty pages for write-back.
    pub fn flush_async(&self) -> Result<(), PlanError> {
        self.mmap
            .flush_async()
            .map_err(|e| PlanError::io(&self.path, e))
    }

    /// Write dirty pages back and wait for completion.
    pub fn flush(&self) -> Result<(), PlanError> {
        self.mmap.flush().map_err(|e| PlanError::io(&self.path, e))
    }

    fn entry(&self, index: u32) -> Result<&TransferEntry, PlanError> {
        self.transfers
            .get(index as usize)
            .ok_or(PlanError::TransferOutOfRange {
                index,
                count: self.num_transfers(),
            })
    }

    fn chunk_offset(&self, transfer: u32, chunk: u32) -> Result<usize, PlanError> {
        let entry = self.entry(transfer)?;
        if chunk >= entry.num_chunks {
            return Err(PlanError::ChunkOutOfRange {
                index: chunk,
                count: entry.num_chunks,
            });
        }
        Ok(entry.chunk_table_offset + chunk as usize * CHUNK_ENTRY_SIZE)
    }

    fn atomic_u8(&self, off: usize) -> &AtomicU8 {
        debug_assert!(off < self.len);
        // SAFETY: offsets come from the bounds-checked layout; AtomicU8 has the layout of u8.
        unsafe { &*(self.base.as_ptr().add(off) as *const AtomicU8) }
    }

    fn atomic_bytes(&self, off: usize, len: usize) -> &[AtomicU8] {
        debug_assert!(off + len <= self.len);
        // SAFETY: as for `atomic_u8`, over a contiguous in-bounds range.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(off) as *const AtomicU8, len) }
    }

    fn atomic_u32(&self, off: usize) -> &AtomicU32 {
        debug_assert!(off + 4 <= self.len && off % 4 == 0);
        // SAFETY: in bounds; the mapping is page aligned and transfer records keep this field 4-aligned.
        unsafe { &*(self.base.as_ptr().add(off) as *const AtomicU32) }
    }
}

impl std::fmt::Debug for JobPartPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPartPlan")
            .field("path", &self.path)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// Borrowed view of one transfer record.
#[derive(Clone, Copy)]
pub struct TransferView<'a> {
    plan: &'a JobPartPlan,
    index: u32,
}

impl<'a> TransferView<'a> {
    fn entry(&self) -> &'a TransferEntry {
        &self.plan.transfers[self.index as usize]
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn status(&self) -> TransferStatus {
        let off = self.entry().record_offset + T_STATUS;
        TransferStatus::from_u8(self.plan.atomic_u8(off).load(Ordering::Acquire))
    }

    pub fn source(&self) -> &'a str {
        &self.entry().source
    }

    pub fn destination(&self) -> &'a str {
        &self.entry().destination
    }

    pub fn source_size(&self) -> u64 {
        self.entry().source_size
    }

    pub fn num_chunks(&self) -> u32 {
        self.entry().num_chunks
    }

    pub fn chunk_status(&self, chunk: u32) -> Result<ChunkStatus, PlanError> {
        Ok(self.plan.chunk_info(self.index, chunk)?.status)
    }
}
