//! `ste serve`: run the engine until interrupted.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use ste_core::config::SteConfig;
use ste_core::Ste;

use crate::cli::control_socket::spawn_control_listener;

pub async fn run_serve(mut cfg: SteConfig, workers: Option<usize>, socket: &Path) -> Result<()> {
    if workers.is_some() {
        cfg.worker_count = workers;
    }
    let ste = Arc::new(
        tokio::task::spawn_blocking(move || Ste::start_with_fs(cfg))
            .await
            .context("engine start task failed")??,
    );
    let report = ste.reconstructed();
    println!(
        "ste: {} workers, {} job parts restored ({} unreadable), listening on {}",
        ste.engine().live_workers(),
        report.restored,
        report.failed,
        socket.display()
    );

    let listener = spawn_control_listener(Arc::clone(&ste), socket)?;
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("interrupt received, shutting down");
    listener.abort();
    let _ = std::fs::remove_file(socket);

    tokio::task::spawn_blocking(move || ste.shutdown())
        .await
        .context("engine shutdown task failed")??;
    Ok(())
}
