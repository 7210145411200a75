//! Coordinator: turns job-part orders into plans, directory entries and
//! transfer messages.
//!
//! A submission either fails before anything is enqueued, or creates (or
//! reopens) the plan, registers it and enqueues one message per transfer.

mod reconstruct;


pub use reconstruct::ReconstructReport;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::channels::{CoordinatorChannels, SendError, TransferMsg};
use crate::common::{CopyJobPartOrder, Location};
use crate::directory::{JobPartDirectory, JobPartPlanInfo};
use crate::error::OrderError;
use crate::job_logger::JobLoggerMap;
use crate::plan::{plan_file_path, DestinationBlobData, JobPartPlan};

/// Result of an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Transfer messages enqueued.
    pub scheduled: u32,
    /// The part already had a plan (on disk or in the directory) that was reused.
    pub reopened: bool,
}

/// Source/destination pairs the engine executes.
pub fn is_supported_route(source: Location, destination: Location) -> bool {
    matches!(
        (source, destination),
        (Location::Local, Location::Blob) | (Location::Blob, Location::Local)
    )
}

#[derive(Debug)]
pub struct Coordinator {
    channels: CoordinatorChannels,
    directory: Arc<JobPartDirectory>,
    loggers: Arc<JobLoggerMap>,
    plan_dir: PathBuf,
    default_block_size: u64,
}

impl Coordinator {
    pub fn new(
        channels: CoordinatorChannels,
        directory: Arc<JobPartDirectory>,
        loggers: Arc<JobLoggerMap>,
        plan_dir: impl Into<PathBuf>,
        default_block_size: u64,
    ) -> Self {
        Self {
            channels,
            directory,
            loggers,
            plan_dir: plan_dir.into(),
            default_block_size,
        }
    }

    pub fn plan_dir(&self) -> &Path {
        &self.plan_dir
    }

    pub fn directory(&self) -> &Arc<JobPartDirectory> {
        &self.directory
    }

    /// Entry point for submitted orders: rejects unsupported routes before
    /// any plan file or directory entry exists, then submits.
    pub fn route_order(&self, order: &CopyJobPartOrder) -> Result<SubmitOutcome, OrderError> {
        if !is_supported_route(order.source_type, order.destination_type) {
            tracing::warn!(
                job_id = %order.job_id,
                part = order.part_num,
                source = %order.source_type,
                destination = %order.destination_type,
                "rejecting order with unsupported route"
            );
            return Err(OrderError::Unsupported {
                source_type: order.source_type,
                destination_type: order.destination_type,
            });
        }
        self.submit_job_part_order(order)
    }

    /// Materialize `order` and enqueue its transfers on the queue for its priority.
    ///
    /// Blocks while that queue is full. An order with an unrecognized
    /// priority is registered but schedules nothing.
    pub fn submit_job_part_order(
        &self,
        order: &CopyJobPartOrder,
    ) -> Result<SubmitOutcome, OrderError> {
        let job_id = order.job_id;
        let part = order.part_num;
        let blob_data = DestinationBlobData::from_attributes(&order.optional_attributes)?;
        let ordered = order.transfers.len();

        let path = plan_file_path(&self.plan_dir, job_id, part);
        let mut reopened_from_disk = false;
        let (info, inserted) = self.directory.get_or_try_insert_with(job_id, part, || {
            reopened_from_disk = path.exists();
            let plan =
                JobPartPlan::create_or_open(&path, order, &blob_data, self.default_block_size)?;
            check_transfer_count(&plan, order)?;
            // The job's logger exists only once one of its parts has a plan.
            let logger = self.loggers.get_or_create(job_id, order.log_verbosity);
            Ok::<_, OrderError>(Arc::new(JobPartPlanInfo::new(plan, logger)))
        })?;
        if !inserted {
            check_transfer_count(info.plan(), order)?;
        }
        let reopened = !inserted || reopened_from_disk;
        let logger = info.logger();

        let priority = order.priority;
        let num_transfers = info.plan().num_transfers();
        let mut scheduled = 0u32;
        for transfer_index in 0..num_transfers {
            let msg = TransferMsg {
                job_id,
                part_num: part,
                transfer_index,
                directory: Arc::clone(&self.directory),
            };
            match self.channels.send_transfer(priority, msg) {
                Ok(()) => scheduled += 1,
                Err(SendError::UnknownPriority) => {
                    logger.warn(format_args!(
                        "part {part} has unrecognized priority; {ordered} transfers not scheduled"
                    ));
                    break;
                }
                Err(SendError::Disconnected) => return Err(OrderError::QueueClosed),
            }
        }

        logger.info(format_args!(
            "part {part} accepted: {scheduled} of {num_transfers} transfers scheduled{}{}",
            if order.is_final_part { " (final part)" } else { "" },
            if reopened { ", existing plan reused" } else { "" },
        ));
        Ok(SubmitOutcome {
            scheduled,
            reopened,
        })
    }
}

fn check_transfer_count(plan: &JobPartPlan, order: &CopyJobPartOrder) -> Result<(), OrderError> {
    if plan.num_transfers() as usize != order.transfers.len() {
        return Err(OrderError::PlanMismatch {
            job_id: order.job_id,
            part: order.part_num,
            existing: plan.num_transfers(),
            ordered: order.transfers.len(),
        });
    }
    Ok(())
}
