use anyhow::Result;
use std::path::Path;
use ste_core::api::Request;
use ste_core::common::JobId;

use super::request_and_print;

/// Cancel every part of `job_id`. In-flight chunks fail; nothing is rolled back.
pub async fn run_cancel(socket: &Path, job_id: JobId) -> Result<()> {
    request_and_print(socket, Request::CancelJob { job_id }).await?;
    Ok(())
}
