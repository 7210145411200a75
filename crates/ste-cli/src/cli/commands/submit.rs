use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use ste_core::api::Request;
use ste_core::common::CopyJobPartOrder;

use super::request_and_print;

/// Submit the order in `path`; `-` reads it from stdin.
pub async fn run_submit(socket: &Path, path: &Path) -> Result<()> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read order from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read order {}", path.display()))?
    };
    let order: CopyJobPartOrder =
        serde_json::from_str(&text).context("order is not a valid job-part order")?;
    request_and_print(socket, Request::Submit { order }).await?;
    Ok(())
}
