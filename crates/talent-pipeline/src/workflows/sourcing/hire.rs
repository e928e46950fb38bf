use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info, warn};

use super::domain::{JobId, JobStatus, Notes, SavedCandidate};
use super::gateway::{GatewayError, SourcingGateway};
use super::locks::JobLocks;
use super::ranking::{next_rank, CandidateRankEngine};
use super::store::JobStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HireError {
    #[error("a hire is already in progress for job {job_id}")]
    AlreadyHiring { job_id: JobId },
    #[error("job {job_id} already hired {hired_candidate}")]
    AlreadyHired {
        job_id: JobId,
        hired_candidate: String,
    },
    /// The job was marked hired but flagging the candidate failed.
    #[error("job {job_id} is marked hired but {candidate_link} could not be flagged: {source}")]
    PartialHireFailure {
        job_id: JobId,
        candidate_link: String,
        source: GatewayError,
    },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Marks a job hired and flags the winning candidate, at most one per job.
pub struct HireWorkflow<G: ?Sized> {
    gateway: Arc<G>,
    store: Arc<JobStore>,
    locks: Arc<JobLocks>,
    shortlist: Arc<CandidateRankEngine<G>>,
    in_flight: Mutex<HashSet<JobId>>,
}

/// Releases the in-flight marker for a job when dropped.
struct InFlightHire<'a> {
    in_flight: &'a Mutex<HashSet<JobId>>,
    job_id: JobId,
}

impl Drop for InFlightHire<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

impl<G> HireWorkflow<G>
where
    G: SourcingGateway + ?Sized,
{
    pub fn new(
        gateway: Arc<G>,
        store: Arc<JobStore>,
        locks: Arc<JobLocks>,
        shortlist: Arc<CandidateRankEngine<G>>,
    ) -> Self {
        Self {
            gateway,
            store,
            locks,
            shortlist,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_hiring(&self, job_id: &JobId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(job_id)
    }

    fn begin(&self, job_id: &JobId) -> Result<InFlightHire<'_>, HireError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(job_id.clone()) {
            return Err(HireError::AlreadyHiring {
                job_id: job_id.clone(),
            });
        }
        Ok(InFlightHire {
            in_flight: &self.in_flight,
            job_id: job_id.clone(),
        })
    }

    /// Set the job to `hired`, then upsert the candidate with `hired = true`.
    ///
    /// The two writes are not transactional. If the second fails the saved set
    /// is reloaded and [`HireError::PartialHireFailure`] is returned.
    pub async fn hire(
        &self,
        job_id: &JobId,
        candidate_link: &str,
    ) -> Result<Vec<SavedCandidate>, HireError> {
        let _in_flight = self.begin(job_id)?;
        let _guard = self.locks.acquire(job_id).await;

        let records = self.shortlist.reload(job_id).await?;
        if let Some(winner) = records.iter().find(|record| record.hired) {
            if winner.candidate_link != candidate_link {
                return Err(HireError::AlreadyHired {
                    job_id: job_id.clone(),
                    hired_candidate: winner.candidate_link.clone(),
                });
            }
            if self.store.status(job_id) == Some(JobStatus::Hired) {
                info!(%job_id, candidate_link, "candidate already hired");
                return Ok(records);
            }
        }

        let mut record = records
            .iter()
            .find(|record| record.candidate_link == candidate_link)
            .cloned()
            .unwrap_or_else(|| self.unsaved_record(job_id, candidate_link, &records));

        self.gateway.set_job_status(job_id, JobStatus::Hired).await?;
        self.store.mark_hired(job_id);

        record.hired = true;
        if let Err(source) = self.gateway.update_saved(&record).await {
            error!(%job_id, candidate_link, error = %source, "job marked hired but candidate flag failed");
            if let Err(reload_error) = self.shortlist.reload(job_id).await {
                warn!(%job_id, error = %reload_error, "reconciliation reload failed");
            }
            return Err(HireError::PartialHireFailure {
                job_id: job_id.clone(),
                candidate_link: candidate_link.to_string(),
                source,
            });
        }

        info!(%job_id, candidate_link, "candidate hired");
        Ok(self.shortlist.reload(job_id).await?)
    }

    fn unsaved_record(
        &self,
        job_id: &JobId,
        candidate_link: &str,
        records: &[SavedCandidate],
    ) -> SavedCandidate {
        SavedCandidate {
            job_id: job_id.clone(),
            candidate_link: candidate_link.to_string(),
            name: None,
            job_title: self.store.job(job_id).map(|job| job.display_title()),
            rank: Some(next_rank(records)),
            notes: Notes::default(),
            contacted: false,
            review: None,
            email: None,
            linkedin: None,
            match_score: None,
            reasoning: None,
            hired: false,
            resume_file_id: None,
        }
    }
}
