//! CLI command handlers, one file per command.

mod cancel;
mod completions;
mod details;
mod jobs;
mod serve;
mod submit;
mod summary;
mod transfers;

pub use cancel::run_cancel;
pub use completions::{run_completions, run_man};
pub use details::run_details;
pub use jobs::run_jobs;
pub use serve::run_serve;
pub use submit::run_submit;
pub use summary::run_summary;
pub use transfers::run_transfers;

use anyhow::Result;
use std::path::Path;
use ste_core::api::Request;

use super::control_socket::send_request;

/// Send `request` and print the response. A non-accepted response becomes an
/// error carrying the engine's message.
async fn request_and_print(socket: &Path, request: Request) -> Result<()> {
    let resp = send_request(socket, &request).await?;
    if !resp.is_accepted() {
        anyhow::bail!("{}", resp.message);
    }
    println!("{}", resp.message);
    if let Some(payload) = &resp.payload {
        println!("{}", serde_json::to_string_pretty(payload)?);
    }
    Ok(())
}
