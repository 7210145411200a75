//! On-disk layout of a job-part plan.
//!
//! All integers are little-endian. The file is:
//!
//! ```text
//! [header: HEADER_SIZE bytes]
//! [transfer table: num_transfers * TRANSFER_RECORD_SIZE]
//! [chunk tables: sum(num_chunks) * CHUNK_ENTRY_SIZE]
//! [string area: source/destination paths, UTF-8]
//! ```
//!
//! The header, string area and the fixed fields of each transfer record are
//! written once at creation. Only the transfer status byte, the transfer's
//! outstanding-chunk counter and the chunk entries change afterwards; those
//! are accessed through atomics over the mapping. The mapping is page
//! aligned and every record offset keeps the counter 4-byte aligned.

use std::path::Path;

use super::blob_data::{
    DestinationBlobData, MAX_CONTENT_ENCODING_BYTES, MAX_CONTENT_TYPE_BYTES, MAX_METADATA_BYTES,
};
use crate::checksum::TAG_LEN;
use crate::chunking;
use crate::common::{CopyJobPartOrder, JobId, Location, LogLevel, PartNumber, Priority};
use crate::error::PlanError;

pub(crate) const MAGIC: &[u8; 8] = b"STEPLAN\0";

/// Current plan format version; part of the file name.
pub const PLAN_VERSION: u32 = 1;

pub(crate) const HEADER_SIZE: usize = 1600;
pub(crate) const TRANSFER_RECORD_SIZE: usize = 64;
pub(crate) const CHUNK_ENTRY_SIZE: usize = 20;

/// Upper bound on the chunks of one part, so a plan is at most ~80 MiB of chunk entries.
pub const MAX_CHUNKS_PER_PART: u64 = 4 * 1024 * 1024;

// Header field offsets.
const H_MAGIC: usize = 0;
const H_VERSION: usize = 8;
const H_JOB_ID: usize = 16;
const H_PART: usize = 32;
const H_NUM_TRANSFERS: usize = 36;
const H_IS_FINAL: usize = 40;
const H_PRIORITY: usize = 41;
const H_LOG_LEVEL: usize = 42;
const H_SOURCE_TYPE: usize = 43;
const H_DEST_TYPE: usize = 44;
const H_BLOCK_SIZE: usize = 48;
const H_TRANSFER_TABLE: usize = 56;
const H_STRING_AREA: usize = 64;
const H_CONTENT_TYPE: usize = 72;
const H_CONTENT_ENCODING: usize = H_CONTENT_TYPE + 2 + MAX_CONTENT_TYPE_BYTES;
const H_METADATA: usize = H_CONTENT_ENCODING + 2 + MAX_CONTENT_ENCODING_BYTES;
const _: () = assert!(H_METADATA + 2 + MAX_METADATA_BYTES <= HEADER_SIZE);

// Transfer record field offsets.
const T_SOURCE_OFFSET: usize = 0;
const T_SOURCE_LEN: usize = 8;
const T_DEST_LEN: usize = 12;
const T_DEST_OFFSET: usize = 16;
const T_SOURCE_SIZE: usize = 24;
const T_CHUNK_TABLE: usize = 32;
const T_NUM_CHUNKS: usize = 40;
pub(crate) const T_OUTSTANDING: usize = 44;
pub(crate) const T_STATUS: usize = 48;

// Chunk entry field offsets.
pub(crate) const C_TAG: usize = 0;
pub(crate) const C_STATUS: usize = TAG_LEN;

/// Write-once header of a job-part plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanHeader {
    pub job_id: JobId,
    pub part_num: PartNumber,
    pub num_transfers: u32,
    pub is_final_part: bool,
    pub priority: Priority,
    pub log_level: LogLevel,
    pub source_type: Location,
    pub destination_type: Location,
    /// Chunk size in bytes used to lay out every transfer of this part.
    pub block_size: u64,
    pub blob_data: DestinationBlobData,
}

/// Immutable fields of one transfer record, decoded at open.
#[derive(Debug, Clone)]
pub(crate) struct TransferEntry {
    pub source: String,
    pub destination: String,
    pub source_size: u64,
    pub num_chunks: u32,
    pub record_offset: usize,
    pub chunk_table_offset: usize,
}

/// Serialize a new plan for `order`. Every transfer and chunk starts `NotStarted`.
pub(crate) fn encode_plan(
    order: &CopyJobPartOrder,
    blob_data: &DestinationBlobData,
    block_size: u64,
) -> Result<Vec<u8>, PlanError> {
    let count = order.transfers.len();
    let num_transfers =
        u32::try_from(count).map_err(|_| PlanError::TooManyTransfers { count })?;
    let block_size = block_size.max(1);

    let transfer_table = HEADER_SIZE;
    let chunk_tables = transfer_table + count * TRANSFER_RECORD_SIZE;
    let mut chunk_counts = Vec::with_capacity(count);
    let mut total_chunks: u64 = 0;
    for t in &order.transfers {
        let n = chunking::chunk_count(t.source_size, block_size);
        total_chunks = total_chunks.saturating_add(n);
        if total_chunks > MAX_CHUNKS_PER_PART {
            return Err(PlanError::TooManyChunks {
                max: MAX_CHUNKS_PER_PART,
            });
        }
        // Bounded by MAX_CHUNKS_PER_PART above.
        chunk_counts.push(n as u32);
    }
    let total_chunks = total_chunks as usize;
    let string_area = chunk_tables + total_chunks * CHUNK_ENTRY_SIZE;
    let string_bytes: usize = order
        .transfers
        .iter()
        .map(|t| t.source.len() + t.destination.len())
        .sum();

    let mut buf = vec![0u8; string_area + string_bytes];

    buf[H_MAGIC..H_MAGIC + MAGIC.len()].copy_from_slice(MAGIC);
    put_u32(&mut buf, H_VERSION, PLAN_VERSION);
    buf[H_JOB_ID..H_JOB_ID + 16].copy_from_slice(order.job_id.as_bytes());
    put_u32(&mut buf, H_PART, order.part_num);
    put_u32(&mut buf, H_NUM_TRANSFERS, num_transfers);
    buf[H_IS_FINAL] = order.is_final_part as u8;
    buf[H_PRIORITY] = order.priority.as_u8();
    buf[H_LOG_LEVEL] = order.log_verbosity.as_u8();
    buf[H_SOURCE_TYPE] = order.source_type.as_u8();
    buf[H_DEST_TYPE] = order.destination_type.as_u8();
    put_u64(&mut buf, H_BLOCK_SIZE, block_size);
    put_u64(&mut buf, H_TRANSFER_TABLE, transfer_table as u64);
    put_u64(&mut buf, H_STRING_AREA, string_area as u64);
    put_str(&mut buf, H_CONTENT_TYPE, &blob_data.content_type);
    put_str(&mut buf, H_CONTENT_ENCODING, &blob_data.content_encoding);
    put_str(&mut buf, H_METADATA, &blob_data.metadata);

    let mut chunk_cursor = chunk_tables;
    let mut string_cursor = string_area;
    for (i, (t, &num_chunks)) in order.transfers.iter().zip(&chunk_counts).enumerate() {
        let rec = transfer_table + i * TRANSFER_RECORD_SIZE;

        let src_len = len_u32(&t.source)?;
        put_u64(&mut buf, rec + T_SOURCE_OFFSET, string_cursor as u64);
        put_u32(&mut buf, rec + T_SOURCE_LEN, src_len);
        buf[string_cursor..string_cursor + t.source.len()].copy_from_slice(t.source.as_bytes());
        string_cursor += t.source.len();

        let dst_len = len_u32(&t.destination)?;
        put_u64(&mut buf, rec + T_DEST_OFFSET, string_cursor as u64);
        put_u32(&mut buf, rec + T_DEST_LEN, dst_len);
        buf[string_cursor..string_cursor + t.destination.len()]
            .copy_from_slice(t.destination.as_bytes());
        string_cursor += t.destination.len();

        put_u64(&mut buf, rec + T_SOURCE_SIZE, t.source_size);
        put_u64(&mut buf, rec + T_CHUNK_TABLE, chunk_cursor as u64);
        put_u32(&mut buf, rec + T_NUM_CHUNKS, num_chunks);
        put_u32(&mut buf, rec + T_OUTSTANDING, num_chunks);
        chunk_cursor += num_chunks as usize * CHUNK_ENTRY_SIZE;
    }

    Ok(buf)
}

/// Decode and bounds-check the header and transfer table of a mapped plan.
pub(crate) fn decode_plan(
    path: &Path,
    bytes: &[u8],
) -> Result<(PlanHeader, Vec<TransferEntry>), PlanError> {
    if bytes.len() < HEADER_SIZE {
        return Err(PlanError::format(path, "file shorter than header"));
    }
    if &bytes[H_MAGIC..H_MAGIC + MAGIC.len()] != MAGIC {
        return Err(PlanError::format(path, "bad magic"));
    }
    let version = get_u32(bytes, H_VERSION);
    if version != PLAN_VERSION {
        return Err(PlanError::Version {
            path: path.to_path_buf(),
            found: version,
            expected: PLAN_VERSION,
        });
    }

    let mut job_id = [0u8; 16];
    job_id.copy_from_slice(&bytes[H_JOB_ID..H_JOB_ID + 16]);
    let num_transfers = get_u32(bytes, H_NUM_TRANSFERS);
    let transfer_table = get_u64(bytes, H_TRANSFER_TABLE) as usize;
    let string_area = get_u64(bytes, H_STRING_AREA) as usize;

    let table_end = (num_transfers as usize)
        .checked_mul(TRANSFER_RECORD_SIZE)
        .and_then(|n| n.checked_add(transfer_table));
    if transfer_table != HEADER_SIZE || table_end.map_or(true, |end| end > bytes.len()) {
        return Err(PlanError::format(path, "transfer table out of bounds"));
    }
    if string_area > bytes.len() {
        return Err(PlanError::format(path, "string area out of bounds"));
    }

    let header = PlanHeader {
        job_id: JobId::from_bytes(job_id),
        part_num: get_u32(bytes, H_PART),
        num_transfers,
        is_final_part: bytes[H_IS_FINAL] != 0,
        priority: Priority::from_u8(bytes[H_PRIORITY]),
        log_level: LogLevel::from_u8(bytes[H_LOG_LEVEL]),
        source_type: Location::from_u8(bytes[H_SOURCE_TYPE]),
        destination_type: Location::from_u8(bytes[H_DEST_TYPE]),
        block_size: get_u64(bytes, H_BLOCK_SIZE).max(1),
        blob_data: DestinationBlobData {
            content_type: get_str(path, bytes, H_CONTENT_TYPE, MAX_CONTENT_TYPE_BYTES)?,
            content_encoding: get_str(path, bytes, H_CONTENT_ENCODING, MAX_CONTENT_ENCODING_BYTES)?,
            metadata: get_str(path, bytes, H_METADATA, MAX_METADATA_BYTES)?,
            block_size: get_u64(bytes, H_BLOCK_SIZE),
        },
    };

    let mut transfers = Vec::with_capacity(num_transfers as usize);
    for i in 0..num_transfers as usize {
        let rec = transfer_table + i * TRANSFER_RECORD_SIZE;
        let source = read_string(
            path,
            bytes,
            get_u64(bytes, rec + T_SOURCE_OFFSET) as usize,
            get_u32(bytes, rec + T_SOURCE_LEN) as usize,
        )?;
        let destination = read_string(
            path,
            bytes,
            get_u64(bytes, rec + T_DEST_OFFSET) as usize,
            get_u32(bytes, rec + T_DEST_LEN) as usize,
        )?;
        let num_chunks = get_u32(bytes, rec + T_NUM_CHUNKS);
        let chunk_table_offset = get_u64(bytes, rec + T_CHUNK_TABLE) as usize;
        let chunk_end = (num_chunks as usize)
            .checked_mul(CHUNK_ENTRY_SIZE)
            .and_then(|n| n.checked_add(chunk_table_offset));
        if chunk_table_offset < table_end.unwrap_or(usize::MAX)
            || chunk_end.map_or(true, |end| end > string_area)
        {
            return Err(PlanError::format(
                path,
                format!("chunk table of transfer {i} out of bounds"),
            ));
        }
        transfers.push(TransferEntry {
            source,
            destination,
            source_size: get_u64(bytes, rec + T_SOURCE_SIZE),
            num_chunks,
            record_offset: rec,
            chunk_table_offset,
        });
    }

    Ok((header, transfers))
}

fn len_u32(s: &str) -> Result<u32, PlanError> {
    u32::try_from(s.len()).map_err(|_| PlanError::TooManyTransfers { count: s.len() })
}

fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut [u8], at: usize, v: u64) {
    buf[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

/// Length-prefixed (u16) string in a fixed-width header field. Callers have validated the width.
fn put_str(buf: &mut [u8], at: usize, s: &str) {
    let len = s.len() as u16;
    buf[at..at + 2].copy_from_slice(&len.to_le_bytes());
    buf[at + 2..at + 2 + s.len()].copy_from_slice(s.as_bytes());
}

fn get_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

fn get_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

fn get_str(path: &Path, buf: &[u8], at: usize, max: usize) -> Result<String, PlanError> {
    let len = u16::from_le_bytes([buf[at], buf[at + 1]]) as usize;
    if len > max {
        return Err(PlanError::format(path, "header string longer than its field"));
    }
    read_string(path, buf, at + 2, len)
}

fn read_string(path: &Path, buf: &[u8], offset: usize, len: usize) -> Result<String, PlanError> {
    let bytes = offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or_else(|| PlanError::format(path, "string out of bounds"))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| PlanError::format(path, "string is not UTF-8"))
}
