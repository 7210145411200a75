//! Control-plane requests and responses.
//!
//! Transport agnostic: the CLI carries these as JSON lines over a Unix
//! socket. Every request yields one [`ApiResponse`]; unknown jobs are client
//! errors, never engine failures.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::common::{CopyJobPartOrder, JobId};
use crate::error::{OrderError, PlanError};
use crate::progress::{self, StatusFilter};
use crate::ste::Ste;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Request {
    Submit {
        order: CopyJobPartOrder,
    },
    ListJobs,
    JobSummary {
        job_id: JobId,
    },
    ListTransfers {
        job_id: JobId,
        #[serde(default)]
        status: StatusFilter,
    },
    JobOrderDetails {
        job_id: JobId,
    },
    CancelJob {
        job_id: JobId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiStatus {
    Accepted,
    BadRequest,
    InternalError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Accepted,
            message: message.into(),
            payload: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::BadRequest,
            message: message.into(),
            payload: None,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::InternalError,
            message: message.into(),
            payload: None,
        }
    }

    /// Accepted response carrying `payload`; a serialization failure becomes an internal error.
    fn with_payload<T: Serialize>(message: impl Into<String>, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => Self {
                payload: Some(value),
                ..Self::accepted(message)
            },
            Err(e) => Self::internal_error(format!("failed to serialize response: {e}")),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ApiStatus::Accepted
    }
}

fn unknown_job(job_id: JobId) -> ApiResponse {
    ApiResponse::bad_request(format!("no active job with id {job_id} exists"))
}

/// Handle one request. May block while a submission waits on a full queue.
pub fn serve_request(ste: &Ste, request: Request) -> ApiResponse {
    match request {
        Request::Submit { order } => match ste.submit(&order) {
            Ok(outcome) => ApiResponse::with_payload(
                format!(
                    "job {} part {} accepted; {} transfers scheduled",
                    order.job_id, order.part_num, outcome.scheduled
                ),
                &serde_json::json!({
                    "scheduled": outcome.scheduled,
                    "reopened": outcome.reopened,
                }),
            ),
            Err(e) => order_error_response(&e),
        },
        Request::ListJobs => {
            let mut jobs = ste.directory().load_existing_job_ids();
            jobs.sort();
            ApiResponse::with_payload(format!("{} jobs", jobs.len()), &jobs)
        }
        Request::JobSummary { job_id } => {
            match progress::compute_job_summary(ste.directory(), ste.throughput(), job_id) {
                Some(summary) => ApiResponse::with_payload(
                    format!("job {job_id}: {}% done", summary.percentage_progress),
                    &summary,
                ),
                None => unknown_job(job_id),
            }
        }
        Request::ListTransfers { job_id, status } => {
            match progress::transfer_list(ste.directory(), job_id, status) {
                Some(list) => ApiResponse::with_payload(
                    format!("{} transfers with status {status}", list.len()),
                    &list,
                ),
                None => unknown_job(job_id),
            }
        }
        Request::JobOrderDetails { job_id } => {
            match progress::job_order_details(ste.directory(), job_id) {
                Some(parts) => {
                    ApiResponse::with_payload(format!("job {job_id}: {} parts", parts.len()), &parts)
                }
                None => unknown_job(job_id),
            }
        }
        Request::CancelJob { job_id } => match ste.cancel_job(job_id) {
            Some(parts) => ApiResponse::accepted(format!("job {job_id}: {parts} parts cancelled")),
            None => unknown_job(job_id),
        },
    }
}

fn order_error_response(e: &OrderError) -> ApiResponse {
    match e {
        OrderError::Unsupported { .. }
        | OrderError::Attributes(_)
        | OrderError::PlanMismatch { .. }
        | OrderError::Plan(PlanError::TooManyChunks { .. } | PlanError::TooManyTransfers { .. }) => {
            ApiResponse::bad_request(e.to_string())
        }
        OrderError::Plan(_) | OrderError::QueueClosed => {
            tracing::error!("order failed: {}", e);
            ApiResponse::internal_error(e.to_string())
        }
    }
}

/// Parse one JSON request line and serve it. Malformed input is a client error.
pub fn serve_line(ste: &Ste, line: &str) -> ApiResponse {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => serve_request(ste, request),
        Err(e) => ApiResponse::bad_request(format!("malformed request: {e}")),
    }
}

/// [`serve_line`] on a blocking task, for async transports.
pub async fn serve_line_async(ste: Arc<Ste>, line: String) -> ApiResponse {
    tokio::task::spawn_blocking(move || serve_line(&ste, &line))
        .await
        .unwrap_or_else(|e| ApiResponse::internal_error(format!("request task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CopyTransfer, Location, LogLevel, Priority};

    #[test]
    fn request_json_shape() {
        let id = JobId::new();
        let req: Request = serde_json::from_str(&format!(
            r#"{{"op":"list-transfers","job_id":"{id}","status":"failed"}}"#
        ))
        .unwrap();
        assert!(matches!(
            req,
            Request::ListTransfers { job_id, status: StatusFilter::Failed } if job_id == id
        ));

        let req: Request =
            serde_json::from_str(&format!(r#"{{"op":"list-transfers","job_id":"{id}"}}"#)).unwrap();
        assert!(matches!(
            req,
            Request::ListTransfers {
                status: StatusFilter::All,
                ..
            }
        ));
        assert!(matches!(
            serde_json::from_str::<Request>(r#"{"op":"list-jobs"}"#).unwrap(),
            Request::ListJobs
        ));
    }

    #[test]
    fn submit_request_carries_full_order() {
        let order = CopyJobPartOrder {
            job_id: JobId::new(),
            part_num: 1,
            is_final_part: true,
            priority: Priority::Low,
            log_verbosity: LogLevel::Warning,
            source_type: Location::Blob,
            destination_type: Location::Local,
            transfers: vec![CopyTransfer {
                source: "c/a".to_string(),
                destination: "/tmp/a".to_string(),
                source_size: 3,
            }],
            optional_attributes: Default::default(),
        };
        let line = serde_json::to_string(&Request::Submit {
            order: order.clone(),
        })
        .unwrap();
        match serde_json::from_str::<Request>(&line).unwrap() {
            Request::Submit { order: parsed } => {
                assert_eq!(parsed.job_id, order.job_id);
                assert_eq!(parsed.transfers, order.transfers);
                assert_eq!(parsed.priority, Priority::Low);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn response_omits_empty_payload() {
        let json = serde_json::to_string(&ApiResponse::bad_request("nope")).unwrap();
        assert_eq!(json, r#"{"status":"bad-request","message":"nope"}"#);
        let back: ApiResponse = serde_json::from_str(&json).unwrap();
        assert!(back.payload.is_none());
        assert!(!back.is_accepted());
    }

    #[test]
    fn order_errors_map_to_status_classes() {
        let unsupported = OrderError::Unsupported {
            source_type: Location::Local,
            destination_type: Location::Local,
        };
        assert_eq!(order_error_response(&unsupported).status, ApiStatus::BadRequest);
        assert_eq!(
            order_error_response(&OrderError::QueueClosed).status,
            ApiStatus::InternalError
        );
        let oversized = OrderError::Plan(PlanError::TooManyChunks { max: 16 });
        assert_eq!(order_error_response(&oversized).status, ApiStatus::BadRequest);
        let io = OrderError::Plan(PlanError::io(
            "/plans/x",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        ));
        assert_eq!(order_error_response(&io).status, ApiStatus::InternalError);
    }
}
