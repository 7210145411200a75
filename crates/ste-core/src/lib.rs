//! STE core: durable job-part plans, priority scheduling and chunked
//! transfer execution.

pub mod api;
pub mod channels;
pub mod checksum;
pub mod chunking;
pub mod common;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod engine;
pub mod error;
pub mod job_logger;
pub mod logging;
pub mod plan;
pub mod progress;
pub mod storage;
pub mod ste;
pub mod transport;

pub use ste::Ste;
