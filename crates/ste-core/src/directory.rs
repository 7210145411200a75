//! Job-part directory: job id -> part number -> plan handle.
//!
//! Written by the coordinator (orders, reconstruction), read by status
//! queries and by workers resolving transfer messages. All locking is
//! internal; callers never hold a lock across calls.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

use crate::common::{JobId, PartNumber};
use crate::error::EngineError;
use crate::job_logger::JobLogger;
use crate::plan::JobPartPlan;

/// Directory entry for one (job, part): the mapped plan, its cancellation
/// scope and the job's logger.
#[derive(Debug)]
pub struct JobPartPlanInfo {
    plan: JobPartPlan,
    cancel: CancellationToken,
    logger: Arc<JobLogger>,
}

impl JobPartPlanInfo {
    pub fn new(plan: JobPartPlan, logger: Arc<JobLogger>) -> Self {
        Self {
            plan,
            cancel: CancellationToken::new(),
            logger,
        }
    }

    pub fn plan(&self) -> &JobPartPlan {
        &self.plan
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn job_id(&self) -> JobId {
        self.plan.header().job_id
    }

    pub fn part_num(&self) -> PartNumber {
        self.plan.header().part_num
    }
}

/// Parts of one job, ordered by part number.
pub type PartPlanMap = BTreeMap<PartNumber, Arc<JobPartPlanInfo>>;

type BuildGate = Arc<Mutex<()>>;

#[derive(Debug, Default)]
pub struct JobPartDirectory {
    jobs: RwLock<HashMap<JobId, PartPlanMap>>,
    /// One gate per (job, part) whose entry is being built; serializes builders of the same part only.
    building: Mutex<HashMap<(JobId, PartNumber), BuildGate>>,
}

impl JobPartDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for (job, part). Returns the previous entry, if any.
    pub fn store_job_part_plan_info(
        &self,
        job_id: JobId,
        part: PartNumber,
        info: Arc<JobPartPlanInfo>,
    ) -> Option<Arc<JobPartPlanInfo>> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job_id)
            .or_default()
            .insert(part, info)
    }

    /// Existing entry for (job, part), or the one built by `make` if absent.
    /// The boolean is true when `make` ran and its entry was inserted.
    ///
    /// `make` runs without the directory lock held, so readers and other
    /// parts are never blocked behind it. Concurrent callers for the same
    /// part wait for each other and `make` runs at most once per success.
    pub fn get_or_try_insert_with<E>(
        &self,
        job_id: JobId,
        part: PartNumber,
        make: impl FnOnce() -> Result<Arc<JobPartPlanInfo>, E>,
    ) -> Result<(Arc<JobPartPlanInfo>, bool), E> {
        if let Some(existing) = self.load_job_part_plan_info_for_job_part(job_id, part) {
            return Ok((existing, false));
        }

        let key = (job_id, part);
        let gate = Arc::clone(self.building().entry(key).or_default());
        let result = {
            let _exclusive = gate.lock().unwrap_or_else(PoisonError::into_inner);
            match self.load_job_part_plan_info_for_job_part(job_id, part) {
                Some(existing) => Ok((existing, false)),
                None => make().map(|info| self.insert_if_vacant(job_id, part, info)),
            }
        };

        // Gate references only change under the `building` lock, so the count is exact here.
        let mut building = self.building();
        if Arc::strong_count(&gate) == 2 {
            building.remove(&key);
        }
        drop(gate);
        drop(building);
        result
    }

    fn insert_if_vacant(
        &self,
        job_id: JobId,
        part: PartNumber,
        info: Arc<JobPartPlanInfo>,
    ) -> (Arc<JobPartPlanInfo>, bool) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.entry(job_id).or_default().entry(part) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
            Entry::Vacant(slot) => (Arc::clone(slot.insert(info)), true),
        }
    }

    fn building(&self) -> std::sync::MutexGuard<'_, HashMap<(JobId, PartNumber), BuildGate>> {
        self.building.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load_job_part_plan_info_for_job_part(
        &self,
        job_id: JobId,
        part: PartNumber,
    ) -> Option<Arc<JobPartPlanInfo>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .and_then(|parts| parts.get(&part))
            .cloned()
    }

    /// Snapshot of every part of `job_id`, or None if the job is unknown.
    pub fn load_part_plan_map_for_job(&self, job_id: JobId) -> Option<PartPlanMap> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned()
    }

    /// Like [`Self::load_part_plan_map_for_job`] for callers whose bookkeeping
    /// guarantees the job exists; a miss is an invariant violation.
    pub fn expect_part_plan_map(&self, job_id: JobId) -> Result<PartPlanMap, EngineError> {
        self.load_part_plan_map_for_job(job_id)
            .ok_or(EngineError::MissingJob(job_id))
    }

    /// Entry a transfer message points at; a miss is an invariant violation.
    pub fn expect_job_part(
        &self,
        job_id: JobId,
        part: PartNumber,
    ) -> Result<Arc<JobPartPlanInfo>, EngineError> {
        self.load_job_part_plan_info_for_job_part(job_id, part)
            .ok_or(EngineError::MissingJobPart { job_id, part })
    }

    /// Known job ids, in no particular order.
    pub fn load_existing_job_ids(&self) -> Vec<JobId> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Total number of (job, part) entries.
    pub fn part_count(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|parts| parts.len())
            .sum()
    }
}
