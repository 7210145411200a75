use super::super::{Cli, CliCommand};
use super::parse;
use clap::Parser;
use std::path::PathBuf;
use ste_core::progress::StatusFilter;

const JOB: &str = "6f1c2a1e-9b8d-4c1e-a7f0-3d2b1c0e9f8a";

#[test]
fn cli_parse_serve() {
    match parse(&["ste", "serve"]) {
        CliCommand::Serve { workers } => assert_eq!(workers, None),
        _ => panic!("expected Serve"),
    }
    match parse(&["ste", "serve", "--workers", "3"]) {
        CliCommand::Serve { workers } => assert_eq!(workers, Some(3)),
        _ => panic!("expected Serve with workers"),
    }
}

#[test]
fn cli_parse_submit() {
    match parse(&["ste", "submit", "order.json"]) {
        CliCommand::Submit { path } => assert_eq!(path, PathBuf::from("order.json")),
        _ => panic!("expected Submit"),
    }
}

#[test]
fn cli_parse_jobs() {
    assert!(matches!(parse(&["ste", "jobs"]), CliCommand::Jobs));
}

#[test]
fn cli_parse_summary_and_details() {
    match parse(&["ste", "summary", JOB]) {
        CliCommand::Summary { job_id } => assert_eq!(job_id.to_string(), JOB),
        _ => panic!("expected Summary"),
    }
    match parse(&["ste", "details", JOB]) {
        CliCommand::Details { job_id } => assert_eq!(job_id.to_string(), JOB),
        _ => panic!("expected Details"),
    }
}

#[test]
fn cli_parse_transfers_status_defaults_to_all() {
    match parse(&["ste", "transfers", JOB]) {
        CliCommand::Transfers { status, .. } => assert_eq!(status, StatusFilter::All),
        _ => panic!("expected Transfers"),
    }
    match parse(&["ste", "transfers", JOB, "--status", "failed"]) {
        CliCommand::Transfers { status, .. } => assert_eq!(status, StatusFilter::Failed),
        _ => panic!("expected Transfers with status"),
    }
}

#[test]
fn cli_parse_cancel() {
    match parse(&["ste", "cancel", JOB]) {
        CliCommand::Cancel { job_id } => assert_eq!(job_id.to_string(), JOB),
        _ => panic!("expected Cancel"),
    }
}

#[test]
fn cli_parse_global_socket() {
    let cli = Cli::try_parse_from(["ste", "jobs", "--socket", "/tmp/ste.sock"]).unwrap();
    assert_eq!(cli.socket, Some(PathBuf::from("/tmp/ste.sock")));
}

#[test]
fn cli_rejects_bad_job_id_and_status() {
    assert!(Cli::try_parse_from(["ste", "summary", "not-a-uuid"]).is_err());
    assert!(Cli::try_parse_from(["ste", "transfers", JOB, "--status", "bogus"]).is_err());
    assert!(Cli::try_parse_from(["ste", "cancel"]).is_err());
}

#[test]
fn cli_parse_completions_and_man() {
    assert!(matches!(
        parse(&["ste", "completions", "bash"]),
        CliCommand::Completions { .. }
    ));
    assert!(matches!(parse(&["ste", "man"]), CliCommand::Man));
}
