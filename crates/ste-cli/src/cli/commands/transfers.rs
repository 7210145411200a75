use anyhow::Result;
use std::path::Path;
use ste_core::api::Request;
use ste_core::common::JobId;
use ste_core::progress::StatusFilter;

use super::request_and_print;

pub async fn run_transfers(socket: &Path, job_id: JobId, status: StatusFilter) -> Result<()> {
    request_and_print(socket, Request::ListTransfers { job_id, status }).await?;
    Ok(())
}
