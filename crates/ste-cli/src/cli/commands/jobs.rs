use anyhow::Result;
use std::path::Path;
use ste_core::api::Request;

use super::request_and_print;

pub async fn run_jobs(socket: &Path) -> Result<()> {
    request_and_print(socket, Request::ListJobs).await?;
    Ok(())
}
