//! Live throughput and job progress, computed on demand for status queries.

mod summary;
mod throughput;

pub use summary::{
    compute_job_summary, job_order_details, transfer_list, JobProgressSummary, JobStatus,
    PartOrderDetails, StatusFilter, TransferDetail,
};
pub use throughput::{ThroughputSample, ThroughputState};
