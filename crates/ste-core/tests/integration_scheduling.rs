//! Integration tests: priority dispatch, throughput sampling, cancellation and
//! the control-plane request surface, against a recording data plane.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::recording_plane::RecordingPlane;
use ste_core::api::{serve_request, ApiStatus, Request};
use ste_core::common::{JobId, Location, Priority, TransferStatus};
use ste_core::plan::plan_file_path;
use ste_core::progress::{JobProgressSummary, JobStatus, StatusFilter, TransferDetail};
use ste_core::Ste;
use tempfile::tempdir;

fn summary(ste: &Ste, job_id: JobId) -> JobProgressSummary {
    let resp = serve_request(ste, Request::JobSummary { job_id });
    assert_eq!(resp.status, ApiStatus::Accepted, "{}", resp.message);
    serde_json::from_value(resp.payload.unwrap()).unwrap()
}

#[test]
fn high_priority_transfers_dispatch_before_low() {
    let dir = tempdir().unwrap();
    let (plane, gate) = RecordingPlane::gated("blocker");
    let plane = Arc::new(plane);
    let ste = Ste::start(common::config(dir.path(), 1), plane.clone()).unwrap();

    // Park the only worker so both queues fill before anything drains.
    let blocker = JobId::new();
    ste.submit(&common::upload_order(
        blocker,
        0,
        true,
        Priority::High,
        &[("blocker", "c/blocker", 10)],
    ))
    .unwrap();
    gate.entered.recv_timeout(Duration::from_secs(10)).unwrap();

    let low = JobId::new();
    let high = JobId::new();
    ste.submit(&common::upload_order(
        low,
        0,
        true,
        Priority::Low,
        &[("low-0", "c/l0", 1), ("low-1", "c/l1", 1), ("low-2", "c/l2", 1)],
    ))
    .unwrap();
    ste.submit(&common::upload_order(
        high,
        0,
        true,
        Priority::High,
        &[("high-0", "c/h0", 1), ("high-1", "c/h1", 1), ("high-2", "c/h2", 1)],
    ))
    .unwrap();
    gate.release.send(()).unwrap();

    common::wait_for_job(&ste, high);
    common::wait_for_job(&ste, low);
    ste.shutdown().unwrap();

    let order: Vec<JobId> = plane
        .prepared()
        .into_iter()
        .map(|(job, _)| job)
        .filter(|&job| job != blocker)
        .collect();
    assert_eq!(order.len(), 6);
    assert!(order[..3].iter().all(|&j| j == high), "{order:?}");
    assert!(order[3..].iter().all(|&j| j == low), "{order:?}");
}

#[test]
fn summary_throughput_counts_only_bytes_since_previous_query() {
    let dir = tempdir().unwrap();
    let ste = Ste::start(common::config(dir.path(), 2), Arc::new(RecordingPlane::new())).unwrap();
    let id = JobId::new();

    ste.submit(&common::upload_order(id, 0, false, Priority::Medium, &[("a", "c/a", 5000)]))
        .unwrap();
    common::wait_for_job(&ste, id);
    let first = summary(&ste, id);
    assert_eq!(first.bytes_since_last_query, 5000);
    assert_eq!(first.job_status, JobStatus::InProgress);
    assert!(!first.complete_job_ordered);

    ste.submit(&common::upload_order(id, 1, true, Priority::Medium, &[("b", "c/b", 700)]))
        .unwrap();
    common::wait_for_job(&ste, id);
    let second = summary(&ste, id);
    assert_eq!(second.bytes_since_last_query, 700);
    assert_eq!(second.total_number_of_transfers, 2);
    assert_eq!(second.percentage_progress, 100);
    assert_eq!(second.job_status, JobStatus::Completed);

    ste.shutdown().unwrap();
}

#[test]
fn cancelled_job_fails_in_flight_transfers() {
    let dir = tempdir().unwrap();
    let (plane, gate) = RecordingPlane::gated("slow");
    let ste = Ste::start(common::config(dir.path(), 2), Arc::new(plane)).unwrap();
    let id = JobId::new();
    ste.submit(&common::upload_order(id, 0, true, Priority::High, &[("slow", "c/slow", 4096)]))
        .unwrap();
    gate.entered.recv_timeout(Duration::from_secs(10)).unwrap();

    let resp = serve_request(&ste, Request::CancelJob { job_id: id });
    assert_eq!(resp.status, ApiStatus::Accepted);
    gate.release.send(()).unwrap();
    common::wait_for_job(&ste, id);

    let s = summary(&ste, id);
    assert_eq!(s.total_number_of_transfers_failed, 1);
    assert_eq!(
        s.failed_transfers,
        vec![TransferDetail {
            source: "slow".to_string(),
            destination: "c/slow".to_string(),
            status: TransferStatus::Failed,
        }]
    );
    assert_eq!(s.job_status, JobStatus::Completed);
    ste.shutdown().unwrap();
}

#[test]
fn unsupported_route_is_rejected_without_side_effects() {
    let dir = tempdir().unwrap();
    let ste = Ste::start(common::config(dir.path(), 1), Arc::new(RecordingPlane::new())).unwrap();
    let id = JobId::new();
    let mut order = common::upload_order(id, 0, true, Priority::High, &[("x", "y", 1)]);
    order.destination_type = Location::Local;

    let resp = serve_request(&ste, Request::Submit { order });
    assert_eq!(resp.status, ApiStatus::BadRequest);
    assert!(resp.message.contains("not supported"), "{}", resp.message);
    assert!(!plan_file_path(&ste.config().plan_dir().unwrap(), id, 0).exists());
    assert!(ste.directory().load_part_plan_map_for_job(id).is_none());
    ste.shutdown().unwrap();
}

#[test]
fn status_queries_for_unknown_jobs_are_client_errors() {
    let dir = tempdir().unwrap();
    let ste = Ste::start(common::config(dir.path(), 1), Arc::new(RecordingPlane::new())).unwrap();
    let missing = JobId::new();
    for req in [
        Request::JobSummary { job_id: missing },
        Request::ListTransfers {
            job_id: missing,
            status: StatusFilter::All,
        },
        Request::JobOrderDetails { job_id: missing },
        Request::CancelJob { job_id: missing },
    ] {
        let resp = serve_request(&ste, req);
        assert_eq!(resp.status, ApiStatus::BadRequest);
        assert!(resp.message.contains(&missing.to_string()));
    }

    let resp = serve_request(&ste, Request::ListJobs);
    assert_eq!(resp.status, ApiStatus::Accepted);
    assert_eq!(resp.payload.unwrap(), serde_json::json!([]));
    ste.shutdown().unwrap();
}

#[test]
fn list_transfers_and_details_reflect_plan_state() {
    let dir = tempdir().unwrap();
    let ste = Ste::start(common::config(dir.path(), 2), Arc::new(RecordingPlane::new())).unwrap();
    let id = JobId::new();
    ste.submit(&common::upload_order(
        id,
        0,
        false,
        Priority::Low,
        &[("a", "c/a", 10), ("b", "c/b", 2048)],
    ))
    .unwrap();
    // Unknown priority: registered, never scheduled.
    ste.submit(&common::upload_order(id, 1, true, Priority::Unknown, &[("z", "c/z", 1)]))
        .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let resp = serve_request(
            &ste,
            Request::ListTransfers {
                job_id: id,
                status: StatusFilter::Complete,
            },
        );
        let done: Vec<TransferDetail> = serde_json::from_value(resp.payload.unwrap()).unwrap();
        if done.len() == 2 {
            break;
        }
        assert!(std::time::Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(10));
    }

    let resp = serve_request(
        &ste,
        Request::ListTransfers {
            job_id: id,
            status: StatusFilter::NotStarted,
        },
    );
    let pending: Vec<TransferDetail> = serde_json::from_value(resp.payload.unwrap()).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].source, "z");

    let resp = serve_request(&ste, Request::JobOrderDetails { job_id: id });
    let details: serde_json::Value = resp.payload.unwrap();
    assert_eq!(details.as_array().unwrap().len(), 2);
    assert_eq!(details[1]["is_final_part"], serde_json::json!(true));

    let s = summary(&ste, id);
    assert_eq!(s.percentage_progress, 66);
    assert_eq!(s.job_status, JobStatus::InProgress);
    ste.shutdown().unwrap();
}
