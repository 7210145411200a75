//! Deterministic plan file names: `<job id>--<part:05>.steV<version>`.
//!
//! The plan directory is scanned at startup, so the name alone must identify
//! the (job, part) pair.

use std::path::{Path, PathBuf};

use super::layout::PLAN_VERSION;
use crate::common::{JobId, PartNumber};

pub fn plan_file_name(job_id: JobId, part: PartNumber) -> String {
    format!("{job_id}--{part:05}.steV{PLAN_VERSION}")
}

pub fn plan_file_path(dir: &Path, job_id: JobId, part: PartNumber) -> PathBuf {
    dir.join(plan_file_name(job_id, part))
}

/// Parse a plan file name back into (job, part). Returns None for anything else
/// in the directory (temp files, other versions, stray files).
pub fn parse_plan_file_name(name: &str) -> Option<(JobId, PartNumber)> {
    let suffix = format!(".steV{PLAN_VERSION}");
    let stem = name.strip_suffix(suffix.as_str())?;
    let (job, part) = stem.split_once("--")?;
    let job_id = job.parse::<JobId>().ok()?;
    let part = part.parse::<PartNumber>().ok()?;
    Some((job_id, part))
}
