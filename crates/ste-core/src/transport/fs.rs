//! Filesystem data plane.
//!
//! `Local` endpoints are paths used as given. `Blob` endpoints are object
//! names resolved under a root directory that stands in for the object store.
//! Destinations are written through `.part` files (see [`crate::storage`]).

use std::collections::HashMap;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[cfg(unix)]
use std::os::unix::fs::FileExt;

use super::{ChunkOutcome, ChunkWork, DataPlane, PrepareOutcome, TransferWork};
use crate::checksum::ContentTag;
use crate::common::{JobId, Location, PartNumber};
use crate::error::TransportError;
use crate::storage::{temp_path, PartFile};

type TransferKey = (JobId, PartNumber, u32);

#[derive(Debug)]
pub struct FsDataPlane {
    blob_root: PathBuf,
    parts: Mutex<HashMap<TransferKey, PartFile>>,
}

impl FsDataPlane {
    pub fn new(blob_root: impl Into<PathBuf>) -> Self {
        Self {
            blob_root: blob_root.into(),
            parts: Mutex::new(HashMap::new()),
        }
    }

    pub fn blob_root(&self) -> &Path {
        &self.blob_root
    }

    /// Filesystem path of an endpoint.
    pub fn resolve(&self, location: Location, path: &str) -> Result<PathBuf, TransportError> {
        match location {
            Location::Local => Ok(PathBuf::from(path)),
            Location::Blob => {
                let name = Path::new(path.trim_start_matches('/'));
                if name.as_os_str().is_empty()
                    || name.components().any(|c| !matches!(c, Component::Normal(_)))
                {
                    return Err(TransportError::InvalidBlobPath(path.to_string()));
                }
                Ok(self.blob_root.join(name))
            }
            Location::Unknown => Err(TransportError::UnsupportedLocation(location)),
        }
    }

    fn key(work: &TransferWork<'_>) -> TransferKey {
        (work.job_id, work.part_num, work.transfer_index)
    }

    /// Open `.part` of a transfer; reopened from disk when this process did not prepare it.
    fn part_for(&self, work: &TransferWork<'_>) -> Result<PartFile, TransportError> {
        let key = Self::key(work);
        if let Some(p) = self.parts().get(&key) {
            return Ok(p.clone());
        }
        let dest = self.resolve(work.destination_type, work.destination)?;
        let part = PartFile::reopen(&dest)?;
        Ok(self.parts().entry(key).or_insert(part).clone())
    }

    fn parts(&self) -> std::sync::MutexGuard<'_, HashMap<TransferKey, PartFile>> {
        self.parts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataPlane for FsDataPlane {
    fn prepare_transfer(&self, work: &TransferWork<'_>) -> Result<PrepareOutcome, TransportError> {
        if work.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let source = self.resolve(work.source_type, work.source)?;
        let dest = self.resolve(work.destination_type, work.destination)?;
        let meta = std::fs::metadata(&source).map_err(|e| TransportError::io("stat", &source, e))?;
        if meta.len() < work.source_size {
            return Err(TransportError::ShortRead {
                path: source,
                expected: work.source_size,
                received: meta.len(),
            });
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TransportError::io("mkdir", parent, e))?;
        }

        let (part, resumed) = if work.has_progress && temp_path(&dest).exists() {
            (PartFile::reopen(&dest)?, true)
        } else {
            (PartFile::create(&dest, work.source_size)?, false)
        };
        tracing::debug!(
            job_id = %work.job_id,
            part = work.part_num,
            transfer = work.transfer_index,
            temp = %part.temp_path().display(),
            resumed,
            "prepared destination"
        );
        self.parts().insert(Self::key(work), part);
        Ok(PrepareOutcome { resumed })
    }

    fn transfer_chunk(&self, work: &ChunkWork<'_>) -> Result<ChunkOutcome, TransportError> {
        let t = &work.transfer;
        if t.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let source = self.resolve(t.source_type, t.source)?;
        let data = read_range(&source, work.range.offset, work.range.len)?;
        if t.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        self.part_for(t)?.write_at(work.range.offset, &data)?;
        Ok(ChunkOutcome {
            bytes: data.len() as u64,
            tag: ContentTag::of(&data),
        })
    }

    fn finish_transfer(
        &self,
        work: &TransferWork<'_>,
        succeeded: bool,
    ) -> Result<(), TransportError> {
        let dest = self.resolve(work.destination_type, work.destination)?;
        let open = self.parts().remove(&Self::key(work));
        let part = match open {
            Some(p) => p,
            None if succeeded => PartFile::reopen(&dest)?,
            None => return Ok(()),
        };
        if succeeded {
            part.commit()
        } else {
            part.discard()
        }
    }
}

/// Read exactly `len` bytes at `offset`.
fn read_range(path: &Path, offset: u64, len: u64) -> Result<Vec<u8>, TransportError> {
    let file = File::open(path).map_err(|e| TransportError::io("open", path, e))?;
    let len_usize = usize::try_from(len).map_err(|_| TransportError::ShortRead {
        path: path.to_path_buf(),
        expected: len,
        received: 0,
    })?;
    let mut buf = vec![0u8; len_usize];
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = read_at(&file, &mut buf[filled..], offset + filled as u64)
            .map_err(|e| TransportError::io("read", path, e))?;
        if n == 0 {
            return Err(TransportError::ShortRead {
                path: path.to_path_buf(),
                expected: len,
                received: filled as u64,
            });
        }
        filled += n;
    }
    Ok(buf)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    file.read_at(buf, offset)
}

#[cfg(not(unix))]
fn read_at(mut file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}
