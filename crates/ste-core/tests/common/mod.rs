//! Shared helpers for ste-core integration tests.

#![allow(dead_code)]

pub mod recording_plane;

use std::path::Path;
use std::time::{Duration, Instant};

use ste_core::common::{
    BlobTransferAttributes, CopyJobPartOrder, CopyTransfer, JobId, Location, LogLevel, Priority,
};
use ste_core::config::SteConfig;
use ste_core::progress::{transfer_list, StatusFilter};
use ste_core::Ste;

/// Config rooted in `dir` with a small block size so tests get several chunks.
pub fn config(dir: &Path, workers: usize) -> SteConfig {
    SteConfig {
        worker_count: Some(workers),
        block_size_bytes: 1024,
        ..SteConfig::rooted_at(dir)
    }
}

/// Upload order with one transfer per `(source, destination, size)`.
pub fn upload_order(
    job_id: JobId,
    part: u32,
    is_final: bool,
    priority: Priority,
    transfers: &[(&str, &str, u64)],
) -> CopyJobPartOrder {
    CopyJobPartOrder {
        job_id,
        part_num: part,
        is_final_part: is_final,
        priority,
        log_verbosity: LogLevel::Debug,
        source_type: Location::Local,
        destination_type: Location::Blob,
        transfers: transfers
            .iter()
            .map(|&(source, destination, source_size)| CopyTransfer {
                source: source.to_string(),
                destination: destination.to_string(),
                source_size,
            })
            .collect(),
        optional_attributes: BlobTransferAttributes::default(),
    }
}

/// Block until every known transfer of `job_id` is Complete or Failed.
pub fn wait_for_job(ste: &Ste, job_id: JobId) {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let list = transfer_list(ste.directory(), job_id, StatusFilter::All)
            .expect("job should be registered");
        if list.iter().all(|t| t.status.is_terminal()) {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for job {job_id}: {list:?}"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Write `len` bytes of a repeating pattern to `path` and return them.
pub fn write_source(path: &Path, len: usize) -> Vec<u8> {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, &data).unwrap();
    data
}
