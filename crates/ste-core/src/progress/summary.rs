//! Read-side aggregation over the job-part directory.
//!
//! Everything here is recomputed per query from the live plans; nothing is
//! cached. A `None` return means the job is unknown, which callers report as
//! a client error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ThroughputState;
use crate::common::{JobId, PartNumber, Priority, TransferStatus};
use crate::directory::JobPartDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    InProgress,
    Completed,
}

/// One transfer's endpoints and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDetail {
    pub source: String,
    pub destination: String,
    pub status: TransferStatus,
}

/// Job-wide progress at the time of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgressSummary {
    pub job_id: JobId,
    pub job_status: JobStatus,
    /// True once the part flagged final has been ordered.
    pub complete_job_ordered: bool,
    pub total_number_of_transfers: u32,
    pub total_number_of_transfers_completed: u32,
    pub total_number_of_transfers_failed: u32,
    pub percentage_progress: u32,
    /// Bytes moved since the previous summary query, process wide.
    pub bytes_since_last_query: u64,
    pub throughput_in_bytes_per_second: f64,
    pub failed_transfers: Vec<TransferDetail>,
}

/// Transfers of one part, for the detailed job view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartOrderDetails {
    pub part_num: PartNumber,
    pub is_final_part: bool,
    pub priority: Priority,
    pub transfers: Vec<TransferDetail>,
}

/// Status selector for transfer listings; `All` disables filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFilter {
    #[default]
    All,
    NotStarted,
    InProgress,
    Complete,
    Failed,
}

impl StatusFilter {
    pub fn matches(self, status: TransferStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::NotStarted => status == TransferStatus::NotStarted,
            StatusFilter::InProgress => status == TransferStatus::InProgress,
            StatusFilter::Complete => status == TransferStatus::Complete,
            StatusFilter::Failed => status == TransferStatus::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::NotStarted => "not-started",
            StatusFilter::InProgress => "in-progress",
            StatusFilter::Complete => "complete",
            StatusFilter::Failed => "failed",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "not-started" => Ok(StatusFilter::NotStarted),
            "in-progress" => Ok(StatusFilter::InProgress),
            "complete" => Ok(StatusFilter::Complete),
            "failed" => Ok(StatusFilter::Failed),
            other => Err(format!(
                "unknown status {other:?}; expected all, not-started, in-progress, complete or failed"
            )),
        }
    }
}

/// Summarize every part of `job_id`. Samples (and advances) the throughput snapshot.
pub fn compute_job_summary(
    directory: &JobPartDirectory,
    throughput: &ThroughputState,
    job_id: JobId,
) -> Option<JobProgressSummary> {
    let parts = directory.load_part_plan_map_for_job(job_id)?;

    let mut complete_job_ordered = false;
    let mut total = 0u32;
    let mut completed = 0u32;
    let mut failed = 0u32;
    let mut failed_transfers = Vec::new();
    for info in parts.values() {
        let plan = info.plan();
        complete_job_ordered |= plan.is_final_part();
        total += plan.num_transfers();
        for index in 0..plan.num_transfers() {
            let t = plan.transfer(index);
            match t.status() {
                TransferStatus::Complete => completed += 1,
                TransferStatus::Failed => {
                    failed += 1;
                    failed_transfers.push(TransferDetail {
                        source: t.source().to_string(),
                        destination: t.destination().to_string(),
                        status: TransferStatus::Failed,
                    });
                }
                TransferStatus::NotStarted | TransferStatus::InProgress => {}
            }
        }
    }

    let terminal = completed + failed;
    let job_status = if terminal == total && complete_job_ordered {
        JobStatus::Completed
    } else {
        JobStatus::InProgress
    };
    let percentage_progress = if total == 0 {
        0
    } else {
        (u64::from(terminal) * 100 / u64::from(total)) as u32
    };
    let sample = throughput.sample();

    Some(JobProgressSummary {
        job_id,
        job_status,
        complete_job_ordered,
        total_number_of_transfers: total,
        total_number_of_transfers_completed: completed,
        total_number_of_transfers_failed: failed,
        percentage_progress,
        bytes_since_last_query: sample.bytes,
        throughput_in_bytes_per_second: sample.bytes_per_sec,
        failed_transfers,
    })
}

/// Every transfer of `job_id` whose status passes `filter`, in part then index order.
pub fn transfer_list(
    directory: &JobPartDirectory,
    job_id: JobId,
    filter: StatusFilter,
) -> Option<Vec<TransferDetail>> {
    let parts = directory.load_part_plan_map_for_job(job_id)?;
    let mut out = Vec::new();
    for info in parts.values() {
        let plan = info.plan();
        for index in 0..plan.num_transfers() {
            let t = plan.transfer(index);
            let status = t.status();
            if filter.matches(status) {
                out.push(TransferDetail {
                    source: t.source().to_string(),
                    destination: t.destination().to_string(),
                    status,
                });
            }
        }
    }
    Some(out)
}

/// Per-part transfer listing for `job_id`.
pub fn job_order_details(
    directory: &JobPartDirectory,
    job_id: JobId,
) -> Option<Vec<PartOrderDetails>> {
    let parts = directory.load_part_plan_map_for_job(job_id)?;
    let details = parts
        .iter()
        .map(|(&part_num, info)| {
            let plan = info.plan();
            PartOrderDetails {
                part_num,
                is_final_part: plan.is_final_part(),
                priority: plan.header().priority,
                transfers: (0..plan.num_transfers())
                    .map(|i| {
                        let t = plan.transfer(i);
                        TransferDetail {
                            source: t.source().to_string(),
                            destination: t.destination().to_string(),
                            status: t.status(),
                        }
                    })
                    .collect(),
            }
        })
        .collect();
    Some(details)
}
