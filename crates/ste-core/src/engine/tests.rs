//! Engine tests against an in-memory data plane.

use super::*;
use crate::channels::{initialize_channels, ChannelCapacities, CoordinatorChannels, TransferMsg};
use crate::checksum::ContentTag;
use crate::common::{
    ChunkStatus, CopyJobPartOrder, CopyTransfer, JobId, Location, LogLevel, Priority,
    TransferStatus,
};
use crate::directory::{JobPartDirectory, JobPartPlanInfo};
use crate::error::TransportError;
use crate::job_logger::JobLogger;
use crate::plan::{plan_file_path, JobPartPlan};
use crate::transport::{ChunkOutcome, ChunkWork, PrepareOutcome, TransferWork};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Succeeds for every chunk except those of sources listed in `fail_sources`.
#[derive(Default)]
struct MemoryPlane {
    fail_sources: Vec<String>,
    finished: Mutex<Vec<(String, bool)>>,
}

impl DataPlane for MemoryPlane {
    fn prepare_transfer(&self, _work: &TransferWork<'_>) -> Result<PrepareOutcome, TransportError> {
        Ok(PrepareOutcome { resumed: false })
    }

    fn transfer_chunk(&self, work: &ChunkWork<'_>) -> Result<ChunkOutcome, TransportError> {
        if self.fail_sources.iter().any(|s| s == work.transfer.source) {
            return Err(TransportError::Cancelled);
        }
        Ok(ChunkOutcome {
            bytes: work.range.len,
            tag: ContentTag::of(&work.range.offset.to_le_bytes()),
        })
    }

    fn finish_transfer(&self, work: &TransferWork<'_>, succeeded: bool) -> Result<(), TransportError> {
        self.finished
            .lock()
            .unwrap()
            .push((work.source.to_string(), succeeded));
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    directory: Arc<JobPartDirectory>,
    coord: CoordinatorChannels,
    engine: ExecutionEngine,
    throughput: Arc<ThroughputState>,
}

fn harness(workers: usize, plane: Arc<dyn DataPlane>, caps: ChannelCapacities) -> Harness {
    let (coord, channels, control) = initialize_channels(caps);
    let throughput = Arc::new(ThroughputState::new());
    let engine =
        ExecutionEngine::start(workers, channels, control, plane, Arc::clone(&throughput)).unwrap();
    Harness {
        _dir: tempfile::tempdir().unwrap(),
        directory: Arc::new(JobPartDirectory::new()),
        coord,
        engine,
        throughput,
    }
}

impl Harness {
    fn register(&self, job_id: JobId, sizes: &[u64], block: u64) -> Arc<JobPartPlanInfo> {
        let order = CopyJobPartOrder {
            job_id,
            part_num: 0,
            is_final_part: true,
            priority: Priority::High,
            log_verbosity: LogLevel::Debug,
            source_type: Location::Local,
            destination_type: Location::Blob,
            transfers: sizes
                .iter()
                .enumerate()
                .map(|(i, &s)| CopyTransfer {
                    source: format!("src-{i}"),
                    destination: format!("dst-{i}"),
                    source_size: s,
                })
                .collect(),
            optional_attributes: Default::default(),
        };
        let path = plan_file_path(self._dir.path(), job_id, 0);
        let plan = JobPartPlan::create(&path, &order, &Default::default(), block).unwrap();
        let info = Arc::new(JobPartPlanInfo::new(
            plan,
            Arc::new(JobLogger::tracing_only(job_id, LogLevel::Debug)),
        ));
        self.directory.store_job_part_plan_info(job_id, 0, Arc::clone(&info));
        info
    }

    fn send_all(&self, job_id: JobId, n: u32, priority: Priority) {
        for i in 0..n {
            self.coord
                .send_transfer(
                    priority,
                    TransferMsg {
                        job_id,
                        part_num: 0,
                        transfer_index: i,
                        directory: Arc::clone(&self.directory),
                    },
                )
                .unwrap();
        }
    }
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for engine");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn all_terminal(info: &JobPartPlanInfo) -> bool {
    let plan = info.plan();
    (0..plan.num_transfers()).all(|i| plan.transfer(i).status().is_terminal())
}

#[test]
fn transfers_roll_up_from_chunks() {
    let h = harness(4, Arc::new(MemoryPlane::default()), ChannelCapacities::default());
    let id = JobId::new();
    let info = h.register(id, &[10, 0, 33], 4);
    h.send_all(id, 3, Priority::High);
    wait_until(|| all_terminal(&info));

    let plan = info.plan();
    for i in 0..3 {
        let t = plan.transfer(i);
        assert_eq!(t.status(), TransferStatus::Complete);
        for c in 0..t.num_chunks() {
            assert_eq!(t.chunk_status(c).unwrap(), ChunkStatus::Complete);
        }
    }
    assert_eq!(
        plan.chunk_info(2, 8).unwrap().tag,
        ContentTag::of(&32u64.to_le_bytes())
    );
    assert_eq!(h.throughput.current_bytes(), 43);
    h.engine.shutdown().unwrap();
}

#[test]
fn failing_chunks_fail_the_transfer_once() {
    let plane = Arc::new(MemoryPlane {
        fail_sources: vec!["src-1".to_string()],
        ..Default::default()
    });
    let h = harness(3, plane.clone(), ChannelCapacities::default());
    let id = JobId::new();
    let info = h.register(id, &[8, 8], 2);
    h.send_all(id, 2, Priority::Low);
    wait_until(|| all_terminal(&info));
    h.engine.shutdown().unwrap();

    assert_eq!(info.plan().transfer(0).status(), TransferStatus::Complete);
    assert_eq!(info.plan().transfer(1).status(), TransferStatus::Failed);
    let mut finished = plane.finished.lock().unwrap().clone();
    finished.sort();
    assert_eq!(
        finished,
        vec![("src-0".to_string(), true), ("src-1".to_string(), false)]
    );
}

#[test]
fn duplicate_transfer_messages_dispatch_once() {
    let plane = Arc::new(MemoryPlane::default());
    let h = harness(4, plane.clone(), ChannelCapacities::default());
    let id = JobId::new();
    let info = h.register(id, &[64], 1);
    for _ in 0..3 {
        h.send_all(id, 1, Priority::Medium);
    }
    wait_until(|| all_terminal(&info));
    // Let any straggling duplicate drain before counting.
    std::thread::sleep(Duration::from_millis(50));
    h.engine.shutdown().unwrap();
    assert_eq!(plane.finished.lock().unwrap().len(), 1);
    assert_eq!(h.throughput.current_bytes(), 64);
}

#[test]
fn full_chunk_queue_runs_chunks_inline() {
    let caps = ChannelCapacities {
        transfer: 4,
        chunk: 1,
        control: 4,
    };
    let h = harness(1, Arc::new(MemoryPlane::default()), caps);
    let id = JobId::new();
    let info = h.register(id, &[100], 1);
    h.send_all(id, 1, Priority::High);
    wait_until(|| all_terminal(&info));
    assert_eq!(info.plan().transfer(0).status(), TransferStatus::Complete);
    h.engine.shutdown().unwrap();
}

#[test]
fn scale_down_retires_workers() {
    let h = harness(4, Arc::new(MemoryPlane::default()), ChannelCapacities::default());
    assert_eq!(h.engine.live_workers(), 4);
    assert_eq!(h.engine.scale_down(3), 3);
    wait_until(|| h.engine.live_workers() == 1);
    // Tokens are never sent for more workers than are running.
    assert_eq!(h.engine.scale_down(5), 1);
    wait_until(|| h.engine.live_workers() == 0);
    h.engine.shutdown().unwrap();
}

#[test]
fn missing_directory_entry_stops_worker_with_invariant_error() {
    let h = harness(1, Arc::new(MemoryPlane::default()), ChannelCapacities::default());
    h.send_all(JobId::new(), 1, Priority::High);
    wait_until(|| h.engine.live_workers() == 0);
    assert!(matches!(
        h.engine.shutdown(),
        Err(EngineError::MissingJobPart { part: 0, .. })
    ));
}
