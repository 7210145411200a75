//! Priority channel fabric between the coordinator and the execution engine.
//!
//! Three bounded queues per message kind (transfer, chunk), one per
//! priority, plus a bounded control queue of scale-down tokens. Sending into
//! a full queue blocks the sender; that is the backpressure on the
//! coordinator. Receivers drain strictly High, then Medium, then Low (see
//! [`EngineChannels::try_next`]); there is no randomized select across tiers.

use crossbeam_channel::{bounded, Receiver, Select, Sender, TryRecvError, TrySendError};
use std::sync::Arc;

use crate::common::{JobId, PartNumber, Priority};
use crate::directory::{JobPartDirectory, JobPartPlanInfo};

pub const DEFAULT_TRANSFER_QUEUE_CAPACITY: usize = 500;
pub const DEFAULT_CHUNK_QUEUE_CAPACITY: usize = 500;
pub const DEFAULT_CONTROL_QUEUE_CAPACITY: usize = 100;

/// "Execute this transfer." Resolved through the directory by the worker.
#[derive(Debug, Clone)]
pub struct TransferMsg {
    pub job_id: JobId,
    pub part_num: PartNumber,
    pub transfer_index: u32,
    pub directory: Arc<JobPartDirectory>,
}

/// "Execute this chunk of a transfer." Each chunk is in at most one message at a time.
#[derive(Debug, Clone)]
pub struct ChunkMsg {
    pub job_part: Arc<JobPartPlanInfo>,
    pub transfer_index: u32,
    pub chunk_index: u32,
    pub priority: Priority,
}

/// "One worker should exit."
#[derive(Debug, Clone, Copy)]
pub struct SuicideJob;

/// Work item handed to a worker.
#[derive(Debug)]
pub enum Work {
    Transfer(TransferMsg, Priority),
    Chunk(ChunkMsg),
    Exit,
}

/// Queue capacities.
#[derive(Debug, Clone, Copy)]
pub struct ChannelCapacities {
    pub transfer: usize,
    pub chunk: usize,
    pub control: usize,
}

impl Default for ChannelCapacities {
    fn default() -> Self {
        Self {
            transfer: DEFAULT_TRANSFER_QUEUE_CAPACITY,
            chunk: DEFAULT_CHUNK_QUEUE_CAPACITY,
            control: DEFAULT_CONTROL_QUEUE_CAPACITY,
        }
    }
}

/// One sender and receiver per priority.
#[derive(Debug)]
struct Tier<T> {
    high: (Sender<T>, Receiver<T>),
    medium: (Sender<T>, Receiver<T>),
    low: (Sender<T>, Receiver<T>),
}

impl<T> Tier<T> {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Tier {
            high: bounded(capacity),
            medium: bounded(capacity),
            low: bounded(capacity),
        }
    }

    fn senders(&self) -> TierSenders<T> {
        TierSenders {
            high: self.high.0.clone(),
            medium: self.medium.0.clone(),
            low: self.low.0.clone(),
        }
    }

    fn receivers(&self) -> TierReceivers<T> {
        TierReceivers {
            high: self.high.1.clone(),
            medium: self.medium.1.clone(),
            low: self.low.1.clone(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct TierSenders<T> {
    high: Sender<T>,
    medium: Sender<T>,
    low: Sender<T>,
}

impl<T> Clone for TierSenders<T> {
    fn clone(&self) -> Self {
        Self {
            high: self.high.clone(),
            medium: self.medium.clone(),
            low: self.low.clone(),
        }
    }
}

impl<T> TierSenders<T> {
    /// Sender for `priority`, or None for `Priority::Unknown`.
    fn get(&self, priority: Priority) -> Option<&Sender<T>> {
        match priority {
            Priority::High => Some(&self.high),
            Priority::Medium => Some(&self.medium),
            Priority::Low => Some(&self.low),
            Priority::Unknown => None,
        }
    }
}

#[derive(Debug)]
struct TierReceivers<T> {
    high: Receiver<T>,
    medium: Receiver<T>,
    low: Receiver<T>,
}

impl<T> Clone for TierReceivers<T> {
    fn clone(&self) -> Self {
        Self {
            high: self.high.clone(),
            medium: self.medium.clone(),
            low: self.low.clone(),
        }
    }
}

/// Error sending into the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Priority matches none of the three queues.
    UnknownPriority,
    /// Every receiver is gone.
    Disconnected,
}

/// Coordinator side: transfer senders only.
#[derive(Debug, Clone)]
pub struct CoordinatorChannels {
    transfer: TierSenders<TransferMsg>,
}

impl CoordinatorChannels {
    /// Enqueue a transfer on the queue for `priority`. Blocks while that queue is full.
    pub fn send_transfer(&self, priority: Priority, msg: TransferMsg) -> Result<(), SendError> {
        let tx = self
            .transfer
            .get(priority)
            .ok_or(SendError::UnknownPriority)?;
        tx.send(msg).map_err(|_| SendError::Disconnected)
    }
}

/// Engine side: every receiver, chunk senders (workers split transfers into
/// chunks) and the control receiver.
#[derive(Debug, Clone)]
pub struct EngineChannels {
    transfer: TierReceivers<TransferMsg>,
    chunk: TierReceivers<ChunkMsg>,
    chunk_tx: TierSenders<ChunkMsg>,
    control: Receiver<SuicideJob>,
}

impl EngineChannels {
    /// Next work item, preferring the control queue, then High chunk, High
    /// transfer, Medium chunk, Medium transfer, Low chunk, Low transfer.
    /// Returns None when every queue is empty.
    pub fn try_next(&self) -> Option<Work> {
        match self.control.try_recv() {
            Ok(SuicideJob) | Err(TryRecvError::Disconnected) => return Some(Work::Exit),
            Err(TryRecvError::Empty) => {}
        }
        let tiers = [
            (Priority::High, &self.chunk.high, &self.transfer.high),
            (Priority::Medium, &self.chunk.medium, &self.transfer.medium),
            (Priority::Low, &self.chunk.low, &self.transfer.low),
        ];
        for (priority, chunk_rx, transfer_rx) in tiers {
            if let Ok(msg) = chunk_rx.try_recv() {
                return Some(Work::Chunk(msg));
            }
            if let Ok(msg) = transfer_rx.try_recv() {
                return Some(Work::Transfer(msg, priority));
            }
        }
        None
    }

    /// Block until some queue has a message (or is disconnected), then take
    /// the highest-priority item. Readiness only wakes the worker; the choice
    /// of item is always [`Self::try_next`]'s fixed order.
    pub fn next(&self) -> Work {
        loop {
            if let Some(work) = self.try_next() {
                return work;
            }
            let mut sel = Select::new();
            sel.recv(&self.control);
            for rx in [&self.chunk.high, &self.chunk.medium, &self.chunk.low] {
                sel.recv(rx);
            }
            for rx in [&self.transfer.high, &self.transfer.medium, &self.transfer.low] {
                sel.recv(rx);
            }
            sel.ready();
        }
    }

    /// Enqueue a chunk on its priority's queue without blocking. The message
    /// is handed back when it could not be queued.
    pub(crate) fn try_send_chunk(&self, msg: ChunkMsg) -> Result<(), ChunkMsg> {
        let Some(tx) = self.chunk_tx.get(msg.priority) else {
            return Err(msg);
        };
        tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(msg) | TrySendError::Disconnected(msg) => msg,
        })
    }
}

/// Control side: scale-down tokens.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    tx: Sender<SuicideJob>,
}

impl ControlChannel {
    /// Ask one worker to exit. Blocks while the control queue is full.
    pub fn send_suicide(&self) -> Result<(), SendError> {
        self.tx.send(SuicideJob).map_err(|_| SendError::Disconnected)
    }
}

/// Build the fabric and split it into its three sides.
pub fn initialize_channels(
    caps: ChannelCapacities,
) -> (CoordinatorChannels, EngineChannels, ControlChannel) {
    let transfer = Tier::<TransferMsg>::new(caps.transfer);
    let chunk = Tier::<ChunkMsg>::new(caps.chunk);
    let (control_tx, control_rx) = bounded(caps.control.max(1));

    let coordinator = CoordinatorChannels {
        transfer: transfer.senders(),
    };
    let engine = EngineChannels {
        transfer: transfer.receivers(),
        chunk: chunk.receivers(),
        chunk_tx: chunk.senders(),
        control: control_rx,
    };
    (coordinator, engine, ControlChannel { tx: control_tx })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(directory: &Arc<JobPartDirectory>, job_id: JobId, index: u32) -> TransferMsg {
        TransferMsg {
            job_id,
            part_num: 0,
            transfer_index: index,
            directory: Arc::clone(directory),
        }
    }

    #[test]
    fn high_drains_before_low() {
        let (coord, engine, _control) = initialize_channels(ChannelCapacities::default());
        let directory = Arc::new(JobPartDirectory::new());
        let low_job = JobId::new();
        let high_job = JobId::new();
        for i in 0..3 {
            coord
                .send_transfer(Priority::Low, msg(&directory, low_job, i))
                .unwrap();
        }
        for i in 0..3 {
            coord
                .send_transfer(Priority::High, msg(&directory, high_job, i))
                .unwrap();
        }

        let mut order = Vec::new();
        while let Some(work) = engine.try_next() {
            match work {
                Work::Transfer(m, p) => order.push((m.job_id, p)),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(order.len(), 6);
        assert!(order[..3].iter().all(|&(j, p)| j == high_job && p == Priority::High));
        assert!(order[3..].iter().all(|&(j, p)| j == low_job && p == Priority::Low));
    }

    #[test]
    fn medium_between_high_and_low() {
        let (coord, engine, _control) = initialize_channels(ChannelCapacities::default());
        let directory = Arc::new(JobPartDirectory::new());
        let id = JobId::new();
        coord.send_transfer(Priority::Low, msg(&directory, id, 0)).unwrap();
        coord.send_transfer(Priority::Medium, msg(&directory, id, 1)).unwrap();
        coord.send_transfer(Priority::High, msg(&directory, id, 2)).unwrap();
        let seen: Vec<Priority> = std::iter::from_fn(|| engine.try_next())
            .map(|w| match w {
                Work::Transfer(_, p) => p,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(seen, vec![Priority::High, Priority::Medium, Priority::Low]);
    }

    #[test]
    fn control_token_preempts_work() {
        let (coord, engine, control) = initialize_channels(ChannelCapacities::default());
        let directory = Arc::new(JobPartDirectory::new());
        coord
            .send_transfer(Priority::High, msg(&directory, JobId::new(), 0))
            .unwrap();
        control.send_suicide().unwrap();
        assert!(matches!(engine.next(), Work::Exit));
        assert!(matches!(engine.next(), Work::Transfer(_, Priority::High)));
    }

    #[test]
    fn unknown_priority_is_rejected() {
        let (coord, _engine, _control) = initialize_channels(ChannelCapacities::default());
        let directory = Arc::new(JobPartDirectory::new());
        assert_eq!(
            coord.send_transfer(Priority::Unknown, msg(&directory, JobId::new(), 0)),
            Err(SendError::UnknownPriority)
        );
    }

    #[test]
    fn full_queue_blocks_until_drained() {
        let caps = ChannelCapacities {
            transfer: 1,
            chunk: 1,
            control: 1,
        };
        let (coord, engine, _control) = initialize_channels(caps);
        let directory = Arc::new(JobPartDirectory::new());
        let id = JobId::new();
        coord.send_transfer(Priority::Low, msg(&directory, id, 0)).unwrap();

        let sender = {
            let coord = coord.clone();
            let directory = Arc::clone(&directory);
            std::thread::spawn(move || coord.send_transfer(Priority::Low, msg(&directory, id, 1)))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!sender.is_finished());
        assert!(matches!(engine.next(), Work::Transfer(m, _) if m.transfer_index == 0));
        sender.join().unwrap().unwrap();
        assert!(matches!(engine.next(), Work::Transfer(m, _) if m.transfer_index == 1));
    }
}
