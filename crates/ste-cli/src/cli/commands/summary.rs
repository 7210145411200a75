use anyhow::Result;
use std::path::Path;
use ste_core::api::Request;
use ste_core::common::JobId;

use super::request_and_print;

pub async fn run_summary(socket: &Path, job_id: JobId) -> Result<()> {
    request_and_print(socket, Request::JobSummary { job_id }).await?;
    Ok(())
}
