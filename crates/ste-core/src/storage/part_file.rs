use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(windows)]
use std::os::windows::fs::FileExt;

use super::temp_path;
use crate::error::TransportError;

/// Open `.part` file of one destination. Clones share the descriptor, so
/// every chunk worker of a transfer writes through the same handle.
#[derive(Clone, Debug)]
pub struct PartFile {
    file: Arc<File>,
    part_path: PathBuf,
    final_path: PathBuf,
}

impl PartFile {
    /// Start `<final_path>.part` from scratch with `size` bytes reserved.
    /// A stale `.part` from an abandoned attempt is truncated.
    pub fn create(final_path: &Path, size: u64) -> Result<Self, TransportError> {
        let part_path = temp_path(final_path);
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&part_path)
            .map_err(|e| TransportError::io("create", &part_path, e))?;
        reserve(&file, &part_path, size)?;
        Ok(Self {
            file: Arc::new(file),
            part_path,
            final_path: final_path.to_path_buf(),
        })
    }

    /// Pick up `<final_path>.part` as left by an earlier attempt, bytes intact.
    pub fn reopen(final_path: &Path) -> Result<Self, TransportError> {
        let part_path = temp_path(final_path);
        let file = File::options()
            .read(true)
            .write(true)
            .open(&part_path)
            .map_err(|e| TransportError::io("reopen", &part_path, e))?;
        Ok(Self {
            file: Arc::new(file),
            part_path,
            final_path: final_path.to_path_buf(),
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.part_path
    }

    /// Write one chunk's bytes at its offset. Safe to call concurrently for disjoint ranges.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), TransportError> {
        write_all_at(&self.file, data, offset)
            .map_err(|e| TransportError::io("write", &self.part_path, e))
    }

    /// Flush the data and move the `.part` onto the final name.
    pub fn commit(self) -> Result<(), TransportError> {
        self.file
            .sync_all()
            .map_err(|e| TransportError::io("sync", &self.part_path, e))?;
        let PartFile {
            file,
            part_path,
            final_path,
        } = self;
        drop(file);
        std::fs::rename(&part_path, &final_path)
            .map_err(|e| TransportError::io("rename", &final_path, e))
    }

    /// Delete the `.part`. One that is already gone counts as discarded.
    pub fn discard(self) -> Result<(), TransportError> {
        let PartFile {
            file, part_path, ..
        } = self;
        drop(file);
        match std::fs::remove_file(&part_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransportError::io("remove", &part_path, e)),
        }
    }
}

/// Reserve `size` bytes: `posix_fallocate` where available, `set_len` otherwise.
fn reserve(file: &File, path: &Path, size: u64) -> Result<(), TransportError> {
    if size == 0 {
        return Ok(());
    }
    #[cfg(unix)]
    {
        if let Ok(len) = libc::off_t::try_from(size) {
            // SAFETY: the descriptor belongs to `file`, which is open for writing.
            let r = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, len) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, path = %path.display(), "posix_fallocate failed, using set_len");
        }
    }
    file.set_len(size)
        .map_err(|e| TransportError::io("reserve", path, e))
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> std::io::Result<()> {
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> std::io::Result<()> {
    while !data.is_empty() {
        match file.seek_write(data, offset)? {
            0 => return Err(std::io::ErrorKind::WriteZero.into()),
            n => {
                data = &data[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}
