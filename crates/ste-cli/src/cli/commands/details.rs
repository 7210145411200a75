use anyhow::Result;
use std::path::Path;
use ste_core::api::Request;
use ste_core::common::JobId;

use super::request_and_print;

pub async fn run_details(socket: &Path, job_id: JobId) -> Result<()> {
    request_and_print(socket, Request::JobOrderDetails { job_id }).await?;
    Ok(())
}
