use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use super::domain::{Candidate, JobId, JobStatus, SavedCandidate, SourcingJob};
use super::gateway::JobResults;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Why a snapshot was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Partial results while the job is still running.
    Intermediate,
    /// Results of a job that reached a successful terminal status.
    Final,
    /// The job failed; `detail` carries the reason.
    Error,
}

/// Point-in-time view of a job's status and results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub kind: SnapshotKind,
    pub status: JobStatus,
    pub candidate_count: u32,
    pub candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn from_results(job_id: JobId, kind: SnapshotKind, results: JobResults) -> Self {
        let JobResults {
            status,
            candidate_count,
            candidates,
            detail,
            ..
        } = results;
        Self {
            job_id,
            kind,
            status,
            candidate_count: candidate_count.max(candidates.len() as u32),
            candidates,
            detail,
            observed_at: Utc::now(),
        }
    }
}

/// A known job and the last snapshot published for it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEntry {
    pub job: SourcingJob,
    pub snapshot: Option<JobSnapshot>,
}

#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<JobId, JobEntry>,
    saved: HashMap<JobId, Vec<SavedCandidate>>,
}

/// Shared cache of jobs, their latest results, and the saved-candidate slice.
///
/// Writers are partitioned by field: the poller writes status and results,
/// the rank engine and hire workflow write the saved-candidate slice.
#[derive(Debug)]
pub struct JobStore {
    state: Mutex<StoreState>,
    snapshots: broadcast::Sender<JobSnapshot>,
}

impl Default for JobStore {
    fn default() -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(StoreState::default()),
            snapshots,
        }
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stream of every snapshot published after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<JobSnapshot> {
        self.snapshots.subscribe()
    }

    /// Register a job, replacing any previous entry for the same id.
    pub fn insert_job(&self, job: SourcingJob) {
        let mut state = self.lock();
        state.jobs.insert(
            job.job_id.clone(),
            JobEntry {
                job,
                snapshot: None,
            },
        );
    }

    /// Register jobs learned from history without touching tracked ones.
    pub fn remember_jobs(&self, jobs: &[SourcingJob]) {
        let mut state = self.lock();
        for job in jobs {
            state
                .jobs
                .entry(job.job_id.clone())
                .or_insert_with(|| JobEntry {
                    job: job.clone(),
                    snapshot: None,
                });
        }
    }

    pub fn job(&self, job_id: &JobId) -> Option<SourcingJob> {
        self.lock().jobs.get(job_id).map(|entry| entry.job.clone())
    }

    pub fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.lock().jobs.get(job_id).map(|entry| entry.job.status)
    }

    pub fn snapshot(&self, job_id: &JobId) -> Option<JobSnapshot> {
        self.lock()
            .jobs
            .get(job_id)
            .and_then(|entry| entry.snapshot.clone())
    }

    pub fn jobs(&self) -> Vec<SourcingJob> {
        let mut jobs: Vec<SourcingJob> = self
            .lock()
            .jobs
            .values()
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        jobs
    }

    /// Record a snapshot and notify subscribers. The candidate count never
    /// decreases while the job is running.
    pub(crate) fn apply_snapshot(&self, mut snapshot: JobSnapshot) {
        {
            let mut state = self.lock();
            let entry = state
                .jobs
                .entry(snapshot.job_id.clone())
                .or_insert_with(|| JobEntry {
                    job: placeholder_job(&snapshot.job_id, snapshot.status),
                    snapshot: None,
                });

            if snapshot.status == JobStatus::Running
                && snapshot.candidate_count < entry.job.candidate_count
            {
                warn!(
                    job_id = %snapshot.job_id,
                    previous = entry.job.candidate_count,
                    reported = snapshot.candidate_count,
                    "candidate count regressed while running; keeping previous"
                );
                snapshot.candidate_count = entry.job.candidate_count;
            }

            entry.job.status = snapshot.status;
            entry.job.candidate_count = snapshot.candidate_count;
            entry.snapshot = Some(snapshot.clone());
        }

        // No receivers is fine: nobody is watching this job.
        let _ = self.snapshots.send(snapshot);
    }

    /// Status-only update for ticks without candidates.
    pub(crate) fn record_status(&self, job_id: &JobId, status: JobStatus) {
        let mut state = self.lock();
        state
            .jobs
            .entry(job_id.clone())
            .or_insert_with(|| JobEntry {
                job: placeholder_job(job_id, status),
                snapshot: None,
            })
            .job
            .status = status;
    }

    pub(crate) fn mark_hired(&self, job_id: &JobId) {
        self.record_status(job_id, JobStatus::Hired);
    }

    /// Saved candidates of one job in the order the store returned them.
    pub fn saved(&self, job_id: &JobId) -> Vec<SavedCandidate> {
        self.lock().saved.get(job_id).cloned().unwrap_or_default()
    }

    pub fn all_saved(&self) -> Vec<SavedCandidate> {
        let state = self.lock();
        let mut job_ids: Vec<&JobId> = state.saved.keys().collect();
        job_ids.sort();
        job_ids
            .into_iter()
            .flat_map(|job_id| state.saved[job_id].iter().cloned())
            .collect()
    }

    pub(crate) fn replace_saved(&self, job_id: &JobId, records: Vec<SavedCandidate>) {
        let mut state = self.lock();
        if records.is_empty() {
            state.saved.remove(job_id);
        } else {
            state.saved.insert(job_id.clone(), records);
        }
    }

    /// Replace the whole saved slice after a full reload.
    pub(crate) fn replace_all_saved(&self, records: Vec<SavedCandidate>) {
        let mut by_job: HashMap<JobId, Vec<SavedCandidate>> = HashMap::new();
        for record in records {
            by_job.entry(record.job_id.clone()).or_default().push(record);
        }
        self.lock().saved = by_job;
    }
}

fn placeholder_job(job_id: &JobId, status: JobStatus) -> SourcingJob {
    SourcingJob {
        job_id: job_id.clone(),
        status,
        linkedin_prompt: None,
        github_prompt: None,
        structured_jd: None,
        candidate_count: 0,
        created_at: None,
        updated_at: None,
    }
}
