//! Startup reconstruction of the directory from plan files on disk.

use std::sync::Arc;

use super::Coordinator;
use crate::directory::JobPartPlanInfo;
use crate::error::PlanError;
use crate::plan::{parse_plan_file_name, JobPartPlan};

/// What a reconstruction pass found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructReport {
    /// Plans reopened and registered.
    pub restored: usize,
    /// Plans already present in the directory.
    pub already_known: usize,
    /// Plan files that could not be opened.
    pub failed: usize,
}

impl Coordinator {
    /// Reopen every plan file in the plan directory and register the ones the
    /// directory does not know yet. On-disk state is left as is and nothing
    /// is enqueued; a later order for the same part re-drives it.
    pub fn reconstruct_existing_job_parts(&self) -> Result<ReconstructReport, PlanError> {
        let dir = self.plan_dir();
        let mut report = ReconstructReport::default();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(PlanError::io(dir, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| PlanError::io(dir, e))?;
            let name = entry.file_name();
            let Some((job_id, part)) = name.to_str().and_then(parse_plan_file_name) else {
                continue;
            };
            if self
                .directory
                .load_job_part_plan_info_for_job_part(job_id, part)
                .is_some()
            {
                report.already_known += 1;
                continue;
            }

            let path = entry.path();
            let inserted = self.directory.get_or_try_insert_with(job_id, part, || {
                let plan = JobPartPlan::open(&path)?;
                let header = plan.header();
                if header.job_id != job_id || header.part_num != part {
                    return Err(PlanError::format(
                        &path,
                        format!(
                            "file name says job {job_id} part {part}, header says job {} part {}",
                            header.job_id, header.part_num
                        ),
                    ));
                }
                let logger = self.loggers.get_or_create(job_id, header.log_level);
                Ok(Arc::new(JobPartPlanInfo::new(plan, logger)))
            });
            match inserted {
                Ok((_, true)) => {
                    report.restored += 1;
                    tracing::debug!(%job_id, part, path = %path.display(), "restored job part");
                }
                Ok((_, false)) => report.already_known += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = %path.display(), "skipping unreadable plan: {}", e);
                }
            }
        }

        tracing::info!(
            restored = report.restored,
            already_known = report.already_known,
            failed = report.failed,
            "reconstructed job parts from {}",
            dir.display()
        );
        Ok(report)
    }
}
