//! Data plane that moves no bytes but records what the engine asked for.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use ste_core::checksum::ContentTag;
use ste_core::common::JobId;
use ste_core::error::TransportError;
use ste_core::transport::{ChunkOutcome, ChunkWork, DataPlane, PrepareOutcome, TransferWork};

/// Holds `prepare_transfer` for one source until released.
struct Gate {
    source: String,
    entered: Sender<()>,
    release: Receiver<()>,
}

/// Test-side handles of a [`Gate`].
pub struct GateHandle {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

#[derive(Default)]
pub struct RecordingPlane {
    prepared: Mutex<Vec<(JobId, String)>>,
    gate: Option<Gate>,
}

impl RecordingPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plane whose `prepare_transfer` for `source` blocks until the handle releases it.
    pub fn gated(source: &str) -> (Self, GateHandle) {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let plane = Self {
            prepared: Mutex::default(),
            gate: Some(Gate {
                source: source.to_string(),
                entered: entered_tx,
                release: release_rx,
            }),
        };
        (
            plane,
            GateHandle {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }

    /// Sources in the order their transfers were prepared.
    pub fn prepared(&self) -> Vec<(JobId, String)> {
        self.prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DataPlane for RecordingPlane {
    fn prepare_transfer(&self, work: &TransferWork<'_>) -> Result<PrepareOutcome, TransportError> {
        self.prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((work.job_id, work.source.to_string()));
        if let Some(gate) = self.gate.as_ref().filter(|g| g.source == work.source) {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
        Ok(PrepareOutcome { resumed: false })
    }

    fn transfer_chunk(&self, work: &ChunkWork<'_>) -> Result<ChunkOutcome, TransportError> {
        if work.transfer.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        Ok(ChunkOutcome {
            bytes: work.range.len,
            tag: ContentTag::EMPTY,
        })
    }

    fn finish_transfer(&self, _work: &TransferWork<'_>, _succeeded: bool) -> Result<(), TransportError> {
        Ok(())
    }
}
