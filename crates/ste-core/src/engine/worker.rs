//! One execution worker: transfer dispatch, chunk execution and roll-up.

use std::sync::Arc;

use crate::channels::{ChunkMsg, EngineChannels, TransferMsg, Work};
use crate::checksum::ContentTag;
use crate::common::{ChunkStatus, Priority, TransferStatus};
use crate::directory::JobPartPlanInfo;
use crate::error::{EngineError, PlanError};
use crate::progress::ThroughputState;
use crate::transport::{ChunkWork, DataPlane, TransferWork};

pub(crate) struct WorkerContext {
    pub(crate) id: usize,
    pub(crate) channels: EngineChannels,
    pub(crate) data_plane: Arc<dyn DataPlane>,
    pub(crate) throughput: Arc<ThroughputState>,
}

impl WorkerContext {
    /// Worker loop. Returns Ok on a scale-down token, Err on an invariant violation.
    pub(crate) fn run(&self) -> Result<(), EngineError> {
        tracing::debug!(worker = self.id, "worker started");
        loop {
            let step = match self.channels.next() {
                Work::Exit => {
                    tracing::debug!(worker = self.id, "worker exiting");
                    return Ok(());
                }
                Work::Transfer(msg, priority) => self.handle_transfer(msg, priority),
                Work::Chunk(msg) => self.handle_chunk(msg),
            };
            if let Err(e) = step {
                tracing::error!(worker = self.id, "worker stopping: {}", e);
                return Err(e);
            }
        }
    }

    /// Split a transfer into chunk messages at the transfer's priority.
    fn handle_transfer(&self, msg: TransferMsg, priority: Priority) -> Result<(), EngineError> {
        let info = msg.directory.expect_job_part(msg.job_id, msg.part_num)?;
        let plan = info.plan();
        let index = msg.transfer_index;
        let transfer = plan.try_transfer(index)?;
        let logger = info.logger();

        if transfer.status().is_terminal() {
            logger.debug(format_args!(
                "part {} transfer {index} already {}, skipping",
                msg.part_num,
                transfer.status()
            ));
            return Ok(());
        }
        if !plan.claim_transfer(index) {
            logger.debug(format_args!(
                "part {} transfer {index} already dispatched",
                msg.part_num
            ));
            return Ok(());
        }

        let num_chunks = transfer.num_chunks();
        let mut has_progress = false;
        for c in 0..num_chunks {
            if transfer.chunk_status(c)? == ChunkStatus::Complete {
                has_progress = true;
                break;
            }
        }
        plan.set_transfer_status(index, TransferStatus::InProgress)?;

        let work = transfer_work(&info, index, has_progress)?;
        let prepared = self.data_plane.prepare_transfer(&work);
        let outcome = match prepared {
            Ok(outcome) => outcome,
            Err(e) => {
                logger.error(format_args!(
                    "transfer {} -> {} failed to start: {e}",
                    work.source, work.destination
                ));
                for c in 0..num_chunks {
                    if transfer.chunk_status(c)? != ChunkStatus::Complete {
                        plan.update_chunk_info(index, c, ContentTag::EMPTY, ChunkStatus::Failed)?;
                    }
                }
                return self.roll_up(&info, index);
            }
        };
        if !outcome.resumed {
            for c in 0..num_chunks {
                plan.update_chunk_info(index, c, ContentTag::EMPTY, ChunkStatus::NotStarted)?;
            }
        }

        let mut pending = Vec::with_capacity(num_chunks as usize);
        for c in 0..num_chunks {
            if transfer.chunk_status(c)? != ChunkStatus::Complete {
                pending.push(c);
            }
        }
        logger.debug(format_args!(
            "transfer {} -> {}: {} of {num_chunks} chunks to run{}",
            work.source,
            work.destination,
            pending.len(),
            if outcome.resumed { " (resumed)" } else { "" }
        ));
        plan.reset_outstanding(index, pending.len() as u32)?;
        if pending.is_empty() {
            return self.roll_up(&info, index);
        }

        for chunk_index in pending {
            let chunk = ChunkMsg {
                job_part: Arc::clone(&info),
                transfer_index: index,
                chunk_index,
                priority,
            };
            // A full chunk queue runs the chunk here instead of blocking:
            // every worker could otherwise be parked on a send.
            if let Err(chunk) = self.channels.try_send_chunk(chunk) {
                self.handle_chunk(chunk)?;
            }
        }
        Ok(())
    }

    /// Move one chunk through the data plane and record the outcome.
    fn handle_chunk(&self, msg: ChunkMsg) -> Result<(), EngineError> {
        let info = &msg.job_part;
        let plan = info.plan();
        let (t, c) = (msg.transfer_index, msg.chunk_index);
        let range = plan.chunk_range(t, c)?;
        plan.update_chunk_info(t, c, ContentTag::EMPTY, ChunkStatus::InProgress)?;

        let work = ChunkWork {
            transfer: transfer_work(info, t, false)?,
            chunk_index: c,
            range,
        };
        match self.data_plane.transfer_chunk(&work) {
            Ok(out) => {
                plan.update_chunk_info(t, c, out.tag, ChunkStatus::Complete)?;
                self.throughput.update_throughput_counter(out.bytes);
                tracing::trace!(
                    job_id = %work.transfer.job_id,
                    part = work.transfer.part_num,
                    transfer = t,
                    chunk = c,
                    bytes = out.bytes,
                    "chunk complete"
                );
            }
            Err(e) => {
                plan.update_chunk_info(t, c, ContentTag::EMPTY, ChunkStatus::Failed)?;
                info.logger().error(format_args!(
                    "chunk {c} of {} -> {} failed: {e}",
                    work.transfer.source, work.transfer.destination
                ));
            }
        }

        if plan.release_chunk(t)? {
            self.roll_up(info, t)?;
        }
        Ok(())
    }

    /// Settle a transfer whose chunks have all resolved. Runs once per dispatch.
    fn roll_up(&self, info: &JobPartPlanInfo, index: u32) -> Result<(), EngineError> {
        let plan = info.plan();
        let transfer = plan.try_transfer(index)?;
        let mut succeeded = true;
        for c in 0..transfer.num_chunks() {
            if transfer.chunk_status(c)? != ChunkStatus::Complete {
                succeeded = false;
                break;
            }
        }

        let work = transfer_work(info, index, false)?;
        if let Err(e) = self.data_plane.finish_transfer(&work, succeeded) {
            info.logger().error(format_args!(
                "transfer {} -> {} failed to finish: {e}",
                work.source, work.destination
            ));
            succeeded = false;
        }

        let status = if succeeded {
            TransferStatus::Complete
        } else {
            TransferStatus::Failed
        };
        plan.set_transfer_status(index, status)?;
        if let Err(e) = plan.flush_async() {
            tracing::warn!(path = %plan.path().display(), "plan flush failed: {}", e);
        }
        info.logger().info(format_args!(
            "transfer {} -> {} {status}",
            work.source, work.destination
        ));
        Ok(())
    }
}

fn transfer_work(
    info: &JobPartPlanInfo,
    index: u32,
    has_progress: bool,
) -> Result<TransferWork<'_>, PlanError> {
    let plan = info.plan();
    let header = plan.header();
    let transfer = plan.try_transfer(index)?;
    Ok(TransferWork {
        job_id: header.job_id,
        part_num: header.part_num,
        transfer_index: index,
        source_type: header.source_type,
        destination_type: header.destination_type,
        source: transfer.source(),
        destination: transfer.destination(),
        source_size: transfer.source_size(),
        has_progress,
        cancel: info.cancel_token(),
    })
}
