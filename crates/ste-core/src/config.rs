//! Engine configuration loaded from `~/.config/ste/config.toml`.
//!
//! Unset paths fall back to XDG locations under the `ste` prefix.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::channels::{
    ChannelCapacities, DEFAULT_CHUNK_QUEUE_CAPACITY, DEFAULT_CONTROL_QUEUE_CAPACITY,
    DEFAULT_TRANSFER_QUEUE_CAPACITY,
};

/// Default chunk size: 8 MiB.
pub const DEFAULT_BLOCK_SIZE_BYTES: u64 = 8 * 1024 * 1024;

const XDG_PREFIX: &str = "ste";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteConfig {
    /// Directory holding job-part plan files (default: `$XDG_STATE_HOME/ste/plans`).
    #[serde(default)]
    pub plan_dir: Option<PathBuf>,
    /// Directory for per-job log files (default: `$XDG_STATE_HOME/ste/logs`).
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Number of execution workers (default: available parallelism).
    #[serde(default)]
    pub worker_count: Option<usize>,
    /// Chunk size used when an order does not set one.
    pub block_size_bytes: u64,
    pub transfer_queue_capacity: usize,
    pub chunk_queue_capacity: usize,
    pub control_queue_capacity: usize,
    /// Root of the directory-backed blob store (default: `$XDG_DATA_HOME/ste/blob`).
    #[serde(default)]
    pub blob_root: Option<PathBuf>,
    /// Unix socket the CLI talks to (default: `$XDG_STATE_HOME/ste/control.sock`).
    #[serde(default)]
    pub control_socket: Option<PathBuf>,
}

impl Default for SteConfig {
    fn default() -> Self {
        Self {
            plan_dir: None,
            log_dir: None,
            worker_count: None,
            block_size_bytes: DEFAULT_BLOCK_SIZE_BYTES,
            transfer_queue_capacity: DEFAULT_TRANSFER_QUEUE_CAPACITY,
            chunk_queue_capacity: DEFAULT_CHUNK_QUEUE_CAPACITY,
            control_queue_capacity: DEFAULT_CONTROL_QUEUE_CAPACITY,
            blob_root: None,
            control_socket: None,
        }
    }
}

impl SteConfig {
    /// Config with every path under `root`; used by tests and throwaway instances.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            plan_dir: Some(root.join("plans")),
            log_dir: Some(root.join("logs")),
            blob_root: Some(root.join("blob")),
            control_socket: Some(root.join("control.sock")),
            ..Self::default()
        }
    }

    pub fn plan_dir(&self) -> Result<PathBuf> {
        resolve_state_dir(self.plan_dir.as_deref(), "plans")
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        resolve_state_dir(self.log_dir.as_deref(), "logs")
    }

    pub fn blob_root(&self) -> Result<PathBuf> {
        match &self.blob_root {
            Some(p) => Ok(p.clone()),
            None => {
                let xdg_dirs = xdg::BaseDirectories::with_prefix(XDG_PREFIX)?;
                Ok(xdg_dirs.create_data_directory("blob")?)
            }
        }
    }

    pub fn control_socket(&self) -> Result<PathBuf> {
        match &self.control_socket {
            Some(p) => Ok(p.clone()),
            None => {
                let xdg_dirs = xdg::BaseDirectories::with_prefix(XDG_PREFIX)?;
                Ok(xdg_dirs.place_state_file("control.sock")?)
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
    }

    pub fn channel_capacities(&self) -> ChannelCapacities {
        ChannelCapacities {
            transfer: self.transfer_queue_capacity,
            chunk: self.chunk_queue_capacity,
            control: self.control_queue_capacity,
        }
    }
}

fn resolve_state_dir(configured: Option<&Path>, name: &str) -> Result<PathBuf> {
    let dir = match configured {
        Some(p) => p.to_path_buf(),
        None => xdg::BaseDirectories::with_prefix(XDG_PREFIX)?.create_state_directory(name)?,
    };
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix(XDG_PREFIX)?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SteConfig> {
    load_or_init_at(&config_path()?)
}

/// [`load_or_init`] against an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<SteConfig> {
    if !path.exists() {
        let default_cfg = SteConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: SteConfig = toml::from_str(&data)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
