//! Per-job loggers.
//!
//! One logger per job, created by the first order of the job and shared by
//! every part. Lines at or below the job's verbosity are appended to
//! `<log_dir>/<job id>.log` and mirrored to `tracing` with a `job_id` field.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::common::{JobId, LogLevel};

/// Verbosity-gated log for one job.
pub struct JobLogger {
    job_id: JobId,
    verbosity: LogLevel,
    file: Mutex<Option<File>>,
    path: Option<PathBuf>,
}

impl JobLogger {
    /// Logger writing to `<log_dir>/<job id>.log`. If the file cannot be
    /// opened the logger still mirrors to `tracing`.
    pub fn open(job_id: JobId, verbosity: LogLevel, log_dir: &Path) -> Self {
        let path = log_dir.join(format!("{job_id}.log"));
        let file = std::fs::create_dir_all(log_dir)
            .and_then(|_| File::options().create(true).append(true).open(&path));
        match file {
            Ok(f) => JobLogger {
                job_id,
                verbosity,
                file: Mutex::new(Some(f)),
                path: Some(path),
            },
            Err(e) => {
                tracing::warn!(%job_id, path = %path.display(), "job log file unavailable: {}", e);
                Self::tracing_only(job_id, verbosity)
            }
        }
    }

    /// Logger that only mirrors to `tracing`.
    pub fn tracing_only(job_id: JobId, verbosity: LogLevel) -> Self {
        JobLogger {
            job_id,
            verbosity,
            file: Mutex::new(None),
            path: None,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn verbosity(&self) -> LogLevel {
        self.verbosity
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.verbosity
    }

    pub fn log(&self, level: LogLevel, msg: impl fmt::Display) {
        if !self.enabled(level) {
            return;
        }
        let job_id = self.job_id;
        match level {
            LogLevel::Error => tracing::error!(%job_id, "{}", msg),
            LogLevel::Warning => tracing::warn!(%job_id, "{}", msg),
            LogLevel::Info => tracing::info!(%job_id, "{}", msg),
            LogLevel::Debug => tracing::debug!(%job_id, "{}", msg),
        }
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(f) = guard.as_mut() {
            let ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            if let Err(e) = writeln!(f, "{ts} {} {msg}", level.as_str()) {
                tracing::warn!(%job_id, "job log write failed, disabling file output: {}", e);
                *guard = None;
            }
        }
    }

    pub fn error(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Error, msg)
    }

    pub fn warn(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Warning, msg)
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Info, msg)
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Debug, msg)
    }
}

impl fmt::Debug for JobLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobLogger")
            .field("job_id", &self.job_id)
            .field("verbosity", &self.verbosity)
            .field("path", &self.path)
            .finish()
    }
}

/// Registry of job id -> logger, shared by the coordinator and reconstruction.
#[derive(Debug)]
pub struct JobLoggerMap {
    log_dir: PathBuf,
    loggers: RwLock<HashMap<JobId, Arc<JobLogger>>>,
}

impl JobLoggerMap {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            loggers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, job_id: JobId) -> Option<Arc<JobLogger>> {
        self.loggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned()
    }

    /// Logger for `job_id`, created with `verbosity` if this is the job's first order.
    /// Later calls return the existing logger regardless of `verbosity`.
    pub fn get_or_create(&self, job_id: JobId, verbosity: LogLevel) -> Arc<JobLogger> {
        if let Some(logger) = self.get(job_id) {
            return logger;
        }
        let mut loggers = self.loggers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            loggers
                .entry(job_id)
                .or_insert_with(|| Arc::new(JobLogger::open(job_id, verbosity, &self.log_dir))),
        )
    }
}
