//! CLI for the STE transfer engine.
//!
//! `ste serve` runs the engine and its control socket; every other
//! subcommand except `completions` and `man` is a client of that socket.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use ste_core::common::JobId;
use ste_core::config;
use ste_core::progress::StatusFilter;

use commands::{
    run_cancel, run_completions, run_details, run_jobs, run_man, run_serve, run_submit,
    run_summary, run_transfers,
};

/// Top-level CLI for the STE transfer engine.
#[derive(Debug, Parser)]
#[command(name = "ste")]
#[command(about = "STE: prioritized, resumable bulk copy engine", long_about = None)]
pub struct Cli {
    /// Control socket path (default: from config).
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the engine and serve the control socket until interrupted.
    Serve {
        /// Override the configured worker count.
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },

    /// Submit a job-part order from a JSON file ("-" reads stdin).
    Submit {
        /// Path to the order JSON.
        path: PathBuf,
    },

    /// List known job ids.
    Jobs,

    /// Show progress of one job.
    Summary {
        job_id: JobId,
    },

    /// List the transfers of a job, optionally filtered by status.
    Transfers {
        job_id: JobId,
        /// all, not-started, in-progress, complete or failed.
        #[arg(long, default_value = "all")]
        status: StatusFilter,
    },

    /// Show every part of a job with its transfers.
    Details {
        job_id: JobId,
    },

    /// Cancel every part of a job.
    Cancel {
        job_id: JobId,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },

    /// Print the man page to stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Completions { shell } => return run_completions(shell),
            CliCommand::Man => return run_man(),
            _ => {}
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let socket = match cli.socket {
            Some(p) => p,
            None => cfg.control_socket()?,
        };

        match cli.command {
            CliCommand::Serve { workers } => run_serve(cfg, workers, &socket).await?,
            CliCommand::Submit { path } => run_submit(&socket, &path).await?,
            CliCommand::Jobs => run_jobs(&socket).await?,
            CliCommand::Summary { job_id } => run_summary(&socket, job_id).await?,
            CliCommand::Transfers { job_id, status } => {
                run_transfers(&socket, job_id, status).await?
            }
            CliCommand::Details { job_id } => run_details(&socket, job_id).await?,
            CliCommand::Cancel { job_id } => run_cancel(&socket, job_id).await?,
            CliCommand::Completions { .. } | CliCommand::Man => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
