//! Destination files of the filesystem data plane.
//!
//! Every destination is staged as `<dest>.part`. [`PartFile::create`]
//! reserves the full size up front, chunk workers fill it with positioned
//! writes in any order, and [`PartFile::commit`] syncs it and renames it onto
//! `<dest>`. A failed transfer calls [`PartFile::discard`]. A transfer that
//! resumes after a restart picks its `.part` back up with [`PartFile::reopen`].

mod part_file;

pub use part_file::PartFile;

use std::path::{Path, PathBuf};

/// Suffix of in-progress destination files.
pub const TEMP_SUFFIX: &str = ".part";

/// `<final_path>.part`.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}
