//! Control socket: server (during `ste serve`) and client (every other command).
//! Protocol: one JSON request per line in, one JSON response per line out.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use ste_core::api::{self, ApiResponse, Request};
use ste_core::Ste;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Bind `path` (replacing a stale socket) and serve requests against `ste`
/// until the returned task is aborted.
pub fn spawn_control_listener(
    ste: Arc<Ste>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    let _ = std::fs::remove_file(&path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("failed to bind control socket {}", path.display()))?;
    tracing::info!(path = %path.display(), "control socket listening");

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let ste = Arc::clone(&ste);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(ste, stream).await {
                            tracing::debug!("control connection: {}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve_connection(ste: Arc<Ste>, stream: UnixStream) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let response = api::serve_line_async(Arc::clone(&ste), line).await;
        let mut out = serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(r#"{{"status":"internal-error","message":"failed to encode response: {e}"}}"#)
        });
        out.push('\n');
        write.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Send one request and wait for its response.
pub async fn send_request(socket_path: &Path, request: &Request) -> Result<ApiResponse> {
    let stream = UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "cannot reach the engine at {} (is `ste serve` running?)",
            socket_path.display()
        )
    })?;
    let (read, mut write) = stream.into_split();
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    write.write_all(line.as_bytes()).await?;

    let mut lines = BufReader::new(read).lines();
    let reply = lines
        .next_line()
        .await?
        .context("engine closed the connection without a response")?;
    Ok(serde_json::from_str(&reply)?)
}
