//! Process-scoped service bundle: directory, loggers, throughput, channel
//! fabric, coordinator and worker pool, created once at startup.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::channels::initialize_channels;
use crate::common::{CopyJobPartOrder, JobId};
use crate::config::SteConfig;
use crate::coordinator::{Coordinator, ReconstructReport, SubmitOutcome};
use crate::directory::JobPartDirectory;
use crate::engine::ExecutionEngine;
use crate::error::{EngineError, OrderError};
use crate::job_logger::JobLoggerMap;
use crate::progress::ThroughputState;
use crate::transport::{DataPlane, FsDataPlane};

#[derive(Debug)]
pub struct Ste {
    config: SteConfig,
    directory: Arc<JobPartDirectory>,
    throughput: Arc<ThroughputState>,
    coordinator: Coordinator,
    engine: ExecutionEngine,
    reconstructed: ReconstructReport,
}

impl Ste {
    /// Build the services, reconstruct the directory from the plan directory
    /// and start the worker pool.
    pub fn start(config: SteConfig, data_plane: Arc<dyn DataPlane>) -> Result<Self> {
        let plan_dir = config.plan_dir()?;
        let log_dir = config.log_dir()?;

        let directory = Arc::new(JobPartDirectory::new());
        let loggers = Arc::new(JobLoggerMap::new(log_dir));
        let throughput = Arc::new(ThroughputState::new());
        let (coord_tx, engine_rx, control) = initialize_channels(config.channel_capacities());

        let coordinator = Coordinator::new(
            coord_tx,
            Arc::clone(&directory),
            loggers,
            plan_dir,
            config.block_size_bytes,
        );
        let reconstructed = coordinator
            .reconstruct_existing_job_parts()
            .context("failed to reconstruct job parts")?;
        let engine = ExecutionEngine::start(
            config.worker_count(),
            engine_rx,
            control,
            data_plane,
            Arc::clone(&throughput),
        )
        .context("failed to start execution engine")?;

        Ok(Ste {
            config,
            directory,
            throughput,
            coordinator,
            engine,
            reconstructed,
        })
    }

    /// [`Ste::start`] with the filesystem data plane rooted at the configured blob root.
    pub fn start_with_fs(config: SteConfig) -> Result<Self> {
        let blob_root = config.blob_root()?;
        std::fs::create_dir_all(&blob_root)
            .with_context(|| format!("failed to create blob root {}", blob_root.display()))?;
        Self::start(config, Arc::new(FsDataPlane::new(blob_root)))
    }

    pub fn config(&self) -> &SteConfig {
        &self.config
    }

    pub fn directory(&self) -> &JobPartDirectory {
        &self.directory
    }

    pub fn throughput(&self) -> &ThroughputState {
        &self.throughput
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// What startup reconstruction found.
    pub fn reconstructed(&self) -> ReconstructReport {
        self.reconstructed
    }

    /// Route and submit one job-part order.
    pub fn submit(&self, order: &CopyJobPartOrder) -> Result<SubmitOutcome, OrderError> {
        self.coordinator.route_order(order)
    }

    /// Cancel every known part of `job_id`. Returns the number of parts
    /// cancelled, or None if the job is unknown.
    pub fn cancel_job(&self, job_id: JobId) -> Option<usize> {
        let parts = self.directory.load_part_plan_map_for_job(job_id)?;
        for info in parts.values() {
            info.cancel_token().cancel();
            info.logger().warn(format_args!("part {} cancelled", info.part_num()));
        }
        Some(parts.len())
    }

    pub fn scale_down(&self, n: usize) -> usize {
        self.engine.scale_down(n)
    }

    /// Stop the worker pool and flush every plan.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        let result = self.engine.shutdown();
        for job_id in self.directory.load_existing_job_ids() {
            let Some(parts) = self.directory.load_part_plan_map_for_job(job_id) else {
                continue;
            };
            for info in parts.values() {
                if let Err(e) = info.plan().flush() {
                    tracing::warn!(%job_id, part = info.part_num(), "plan flush failed: {}", e);
                }
            }
        }
        tracing::info!("engine shut down");
        result
    }
}
