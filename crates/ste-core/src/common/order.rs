//! Job-part order payload as submitted over the control plane.

use serde::{Deserialize, Serialize};

use super::{JobId, Location, LogLevel, PartNumber, Priority};

/// One source → destination copy unit in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyTransfer {
    pub source: String,
    pub destination: String,
    /// Size of the source in bytes; determines the chunk layout.
    #[serde(default)]
    pub source_size: u64,
}

/// Optional destination attributes for blob uploads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobTransferAttributes {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content_encoding: String,
    /// Metadata as `key=value;key=value`.
    #[serde(default)]
    pub metadata: String,
    /// Chunk size in bytes; 0 uses the configured default.
    #[serde(default)]
    pub block_size_in_bytes: u64,
}

/// One part of a copy job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyJobPartOrder {
    pub job_id: JobId,
    pub part_num: PartNumber,
    #[serde(default)]
    pub is_final_part: bool,
    pub priority: Priority,
    #[serde(default)]
    pub log_verbosity: LogLevel,
    pub source_type: Location,
    pub destination_type: Location,
    #[serde(default)]
    pub transfers: Vec<CopyTransfer>,
    #[serde(default)]
    pub optional_attributes: BlobTransferAttributes,
}
