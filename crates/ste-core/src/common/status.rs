//! Status and classification enums stored in plan files.
//!
//! Each enum has a stable one-byte encoding used by the on-disk layout.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStatus {
    NotStarted,
    InProgress,
    Complete,
    Failed,
}

impl TransferStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            TransferStatus::NotStarted => 0,
            TransferStatus::InProgress => 1,
            TransferStatus::Complete => 2,
            TransferStatus::Failed => 3,
        }
    }

    /// Unknown bytes decode as `Failed` so a corrupted record is never reported as progress.
    pub fn from_u8(b: u8) -> Self {
        match b {
            0 => TransferStatus::NotStarted,
            1 => TransferStatus::InProgress,
            2 => TransferStatus::Complete,
            _ => TransferStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Complete | TransferStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::NotStarted => "not-started",
            TransferStatus::InProgress => "in-progress",
            TransferStatus::Complete => "complete",
            TransferStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single chunk of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkStatus {
    NotStarted,
    InProgress,
    Complete,
    Failed,
}

impl ChunkStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            ChunkStatus::NotStarted => 0,
            ChunkStatus::InProgress => 1,
            ChunkStatus::Complete => 2,
            ChunkStatus::Failed => 3,
        }
    }

    pub fn from_u8(b: u8) -> Self {
        match b {
            0 => ChunkStatus::NotStarted,
            1 => ChunkStatus::InProgress,
            2 => ChunkStatus::Complete,
            _ => ChunkStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ChunkStatus::Complete | ChunkStatus::Failed)
    }
}

/// Scheduling class applied to every transfer and chunk of a job part.
///
/// Unrecognized values deserialize to `Unknown`; the coordinator drops the
/// transfers of such an order instead of failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

impl Priority {
    pub fn as_u8(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
            Priority::Unknown => u8::MAX,
        }
    }

    pub fn from_u8(b: u8) -> Self {
        match b {
            0 => Priority::High,
            1 => Priority::Medium,
            2 => Priority::Low,
            _ => Priority::Unknown,
        }
    }
}

/// Kind of endpoint a transfer reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Local,
    Blob,
    #[serde(other)]
    Unknown,
}

impl Location {
    pub fn as_u8(self) -> u8 {
        match self {
            Location::Unknown => 0,
            Location::Local => 1,
            Location::Blob => 2,
        }
    }

    pub fn from_u8(b: u8) -> Self {
        match b {
            1 => Location::Local,
            2 => Location::Blob,
            _ => Location::Unknown,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Location::Unknown => "unknown",
            Location::Local => "local",
            Location::Blob => "blob",
        };
        f.write_str(s)
    }
}

/// Verbosity of a job's log. Ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            LogLevel::Error => 0,
            LogLevel::Warning => 1,
            LogLevel::Info => 2,
            LogLevel::Debug => 3,
        }
    }

    pub fn from_u8(b: u8) -> Self {
        match b {
            0 => LogLevel::Error,
            1 => LogLevel::Warning,
            2 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}
