use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::domain::{
    Annotation, Candidate, JobGroup, JobId, JobView, Notes, SavedCandidate, SearchPrompts,
    SourcingJob, StructuredJd,
};
use super::gateway::{CreateJobRequest, GatewayError, ResumeUpload, SourcingGateway};
use super::hire::{HireError, HireWorkflow};
use super::locks::JobLocks;
use super::poller::{JobPoller, PollCompletion, PollerError};
use super::ranking::{CandidateRankEngine, RankError};
use super::store::{JobSnapshot, JobStore};

/// Error surfaced to callers of [`CurationFacade`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurationError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("sourcing job {job_id} is unknown to the sourcing service")]
    JobNotFound { job_id: JobId },
    #[error("candidate {candidate_link} is already saved for job {job_id}")]
    DuplicateSave {
        job_id: JobId,
        candidate_link: String,
    },
    #[error("rank {target_rank} is outside 0..{limit}")]
    InvalidRank { target_rank: i64, limit: u32 },
    #[error("operation already in progress: job {job_id} is being polled")]
    AlreadyPolling { job_id: JobId },
    #[error("operation already in progress: a hire for job {job_id} is pending")]
    AlreadyHiring { job_id: JobId },
    #[error("job {job_id} already hired {hired_candidate}")]
    AlreadyHired {
        job_id: JobId,
        hired_candidate: String,
    },
    #[error("job {job_id} is locked after a hire decision")]
    Locked { job_id: JobId },
    #[error("job {job_id} is marked hired but {candidate_link} was not flagged: {detail}")]
    PartialHireFailure {
        job_id: JobId,
        candidate_link: String,
        detail: String,
    },
    #[error("network error: {0}")]
    TransientNetwork(String),
    #[error("sourcing service error: {detail}")]
    ExternalService { status: Option<u16>, detail: String },
}

impl CurationError {
    /// Stable tag for API payloads.
    pub const fn kind(&self) -> &'static str {
        match self {
            CurationError::Validation(_) => "validation",
            CurationError::NotFound(_) => "not_found",
            CurationError::JobNotFound { .. } => "job_not_found",
            CurationError::DuplicateSave { .. } => "duplicate_save",
            CurationError::InvalidRank { .. } => "invalid_rank",
            CurationError::AlreadyPolling { .. } => "already_polling",
            CurationError::AlreadyHiring { .. } => "already_hiring",
            CurationError::AlreadyHired { .. } => "already_hired",
            CurationError::Locked { .. } => "locked",
            CurationError::PartialHireFailure { .. } => "partial_hire_failure",
            CurationError::TransientNetwork(_) => "transient_network",
            CurationError::ExternalService { .. } => "external_service",
        }
    }
}

impl From<GatewayError> for CurationError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::NotFound { detail } => CurationError::NotFound(detail),
            GatewayError::Rejected { detail, .. } => CurationError::Validation(detail),
            GatewayError::Service { status, detail } => CurationError::ExternalService {
                status: Some(status),
                detail,
            },
            GatewayError::Malformed(detail) => CurationError::ExternalService {
                status: None,
                detail,
            },
            GatewayError::Transient(detail) => CurationError::TransientNetwork(detail),
        }
    }
}

impl From<RankError> for CurationError {
    fn from(value: RankError) -> Self {
        match value {
            RankError::DuplicateSave {
                job_id,
                candidate_link,
            } => CurationError::DuplicateSave {
                job_id,
                candidate_link,
            },
            RankError::NotFound {
                job_id,
                candidate_link,
            } => CurationError::NotFound(format!(
                "candidate {candidate_link} is not saved for job {job_id}"
            )),
            RankError::InvalidRank { target_rank, limit } => {
                CurationError::InvalidRank { target_rank, limit }
            }
            RankError::Locked { job_id } => CurationError::Locked { job_id },
            RankError::Gateway(err) => err.into(),
        }
    }
}

impl From<HireError> for CurationError {
    fn from(value: HireError) -> Self {
        match value {
            HireError::AlreadyHiring { job_id } => CurationError::AlreadyHiring { job_id },
            HireError::AlreadyHired {
                job_id,
                hired_candidate,
            } => CurationError::AlreadyHired {
                job_id,
                hired_candidate,
            },
            HireError::PartialHireFailure {
                job_id,
                candidate_link,
                source,
            } => CurationError::PartialHireFailure {
                job_id,
                candidate_link,
                detail: source.to_string(),
            },
            HireError::Gateway(err) => err.into(),
        }
    }
}

impl From<PollerError> for CurationError {
    fn from(value: PollerError) -> Self {
        match value {
            PollerError::AlreadyPolling { job_id } => CurationError::AlreadyPolling { job_id },
        }
    }
}

/// A newly created search and the stop signal of its poll loop.
#[derive(Debug)]
pub struct ActiveSearch {
    pub job_id: JobId,
    pub completion: PollCompletion,
}

/// Entry point for the UI: composes the store, poller, shortlist engine and
/// hire workflow, validates input, and maps failures onto [`CurationError`].
pub struct CurationFacade<G: ?Sized> {
    gateway: Arc<G>,
    store: Arc<JobStore>,
    poller: JobPoller<G>,
    shortlist: Arc<CandidateRankEngine<G>>,
    hiring: HireWorkflow<G>,
    active_search: Mutex<Option<JobId>>,
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, CurationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CurationError::Validation(format!("{field} is required")))
    } else {
        Ok(trimmed)
    }
}

fn candidate_key(job_id: &str, candidate_link: &str) -> Result<(JobId, String), CurationError> {
    let job_id = JobId::from(required(job_id, "job_id")?);
    let candidate_link = required(candidate_link, "candidate_link")?.to_string();
    Ok((job_id, candidate_link))
}

impl<G> CurationFacade<G>
where
    G: SourcingGateway + ?Sized + 'static,
{
    pub fn new(gateway: Arc<G>, poll_interval: Duration) -> Self {
        Self::with_store(gateway, Arc::new(JobStore::new()), poll_interval)
    }

    pub fn with_store(gateway: Arc<G>, store: Arc<JobStore>, poll_interval: Duration) -> Self {
        let locks = Arc::new(JobLocks::default());
        let shortlist = Arc::new(CandidateRankEngine::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            Arc::clone(&locks),
        ));
        let hiring = HireWorkflow::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            locks,
            Arc::clone(&shortlist),
        );
        let poller = JobPoller::new(Arc::clone(&gateway), Arc::clone(&store), poll_interval);

        Self {
            gateway,
            store,
            poller,
            shortlist,
            hiring,
            active_search: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn is_polling(&self, job_id: &JobId) -> bool {
        self.poller.is_polling(job_id)
    }

    pub fn is_hiring(&self, job_id: &JobId) -> bool {
        self.hiring.is_hiring(job_id)
    }

    /// Create a sourcing job and start polling it. Polling of the previously
    /// created search, if still active, is cancelled first.
    pub async fn create_search(
        &self,
        prompts: SearchPrompts,
        structured_jd: Option<StructuredJd>,
    ) -> Result<ActiveSearch, CurationError> {
        let prompts = prompts.normalized().ok_or_else(|| {
            CurationError::Validation(
                "at least one of linkedin_prompt or github_prompt is required".to_string(),
            )
        })?;

        let response = self
            .gateway
            .create_job(CreateJobRequest {
                prompts: prompts.clone(),
                structured_jd: structured_jd.clone(),
            })
            .await?;
        let job_id = response.job_id;
        info!(%job_id, "created sourcing job");

        self.store
            .insert_job(SourcingJob::pending(job_id.clone(), prompts, structured_jd));

        let previous = self
            .active_search
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(job_id.clone());
        if let Some(previous) = previous {
            self.poller.cancel(&previous);
        }

        let completion = self.poller.start(job_id.clone())?;
        Ok(ActiveSearch { job_id, completion })
    }

    /// Start polling a job created earlier.
    pub fn poll(&self, job_id: &str) -> Result<PollCompletion, CurationError> {
        let job_id = JobId::from(required(job_id, "job_id")?);
        Ok(self.poller.start(job_id)?)
    }

    pub fn cancel_poll(&self, job_id: &str) -> Result<(), CurationError> {
        let job_id = JobId::from(required(job_id, "job_id")?);
        self.poller.cancel(&job_id);
        Ok(())
    }

    /// Latest published snapshot for a job, if any.
    pub fn snapshot(&self, job_id: &JobId) -> Option<JobSnapshot> {
        self.store.snapshot(job_id)
    }

    /// Fetch a job and its current results straight from the service.
    pub async fn load_job(&self, job_id: &str) -> Result<JobView, CurationError> {
        let job_id = JobId::from(required(job_id, "job_id")?);
        let results = self.gateway.job_results(&job_id).await.map_err(|err| {
            if err.is_not_found() {
                CurationError::JobNotFound {
                    job_id: job_id.clone(),
                }
            } else {
                err.into()
            }
        })?;

        let mut job = results
            .job_details
            .clone()
            .or_else(|| self.store.job(&job_id))
            .unwrap_or_else(|| SourcingJob::pending(job_id.clone(), SearchPrompts::default(), None));
        job.status = results.status;
        job.candidate_count = results.candidate_count.max(results.candidates.len() as u32);

        Ok(JobView {
            job,
            candidates: results.candidates,
        })
    }

    /// Search history, most recent first as the service orders it.
    pub async fn list_jobs(&self) -> Result<Vec<SourcingJob>, CurationError> {
        let jobs = self.gateway.list_jobs().await?;
        self.store.remember_jobs(&jobs);
        Ok(jobs)
    }

    pub async fn load_groups(&self) -> Result<Vec<JobGroup>, CurationError> {
        Ok(self.shortlist.group_by_title().await?)
    }

    pub async fn load_saved(&self, job_id: &str) -> Result<Vec<SavedCandidate>, CurationError> {
        let job_id = JobId::from(required(job_id, "job_id")?);
        Ok(self.shortlist.reload(&job_id).await?)
    }

    pub async fn save(
        &self,
        job_id: &str,
        candidate: &Candidate,
    ) -> Result<Vec<SavedCandidate>, CurationError> {
        let (job_id, _) = candidate_key(job_id, &candidate.link)?;
        let mut record = SavedCandidate::from_candidate(job_id.clone(), candidate);
        record.candidate_link = record.candidate_link.trim().to_string();
        record.job_title = self.store.job(&job_id).map(|job| job.display_title());
        Ok(self.shortlist.save(record).await?)
    }

    pub async fn reorder(
        &self,
        job_id: &str,
        candidate_link: &str,
        target_rank: i64,
    ) -> Result<Vec<SavedCandidate>, CurationError> {
        let (job_id, candidate_link) = candidate_key(job_id, candidate_link)?;
        Ok(self
            .shortlist
            .reorder(&job_id, &candidate_link, target_rank)
            .await?)
    }

    pub async fn remove(
        &self,
        job_id: &str,
        candidate_link: &str,
    ) -> Result<Vec<SavedCandidate>, CurationError> {
        let (job_id, candidate_link) = candidate_key(job_id, candidate_link)?;
        Ok(self.shortlist.remove(&job_id, &candidate_link).await?)
    }

    /// Hire a candidate. The job's poll loop, if any, is stopped afterwards.
    pub async fn hire(
        &self,
        job_id: &str,
        candidate_link: &str,
    ) -> Result<Vec<SavedCandidate>, CurationError> {
        let (job_id, candidate_link) = candidate_key(job_id, candidate_link)?;
        let records = self.hiring.hire(&job_id, &candidate_link).await?;
        self.poller.cancel(&job_id);
        Ok(records)
    }

    pub async fn update_notes<I, S>(
        &self,
        job_id: &str,
        candidate_link: &str,
        bullets: I,
    ) -> Result<Vec<SavedCandidate>, CurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (job_id, candidate_link) = candidate_key(job_id, candidate_link)?;
        let notes =
            Notes::from_bullets(bullets).map_err(|err| CurationError::Validation(err.to_string()))?;
        Ok(self
            .shortlist
            .edit(&job_id, &candidate_link, move |record| record.notes = notes)
            .await?)
    }

    pub async fn annotate(
        &self,
        job_id: &str,
        candidate_link: &str,
        annotation: Annotation,
    ) -> Result<Vec<SavedCandidate>, CurationError> {
        let (job_id, candidate_link) = candidate_key(job_id, candidate_link)?;
        if let Some(review) = annotation.review {
            if !(1..=5).contains(&review) {
                return Err(CurationError::Validation(format!(
                    "review must be between 1 and 5 (got {review})"
                )));
            }
        }
        let clean = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let Annotation {
            contacted,
            review,
            email,
            linkedin,
        } = annotation;
        let (email, linkedin) = (clean(email), clean(linkedin));

        Ok(self
            .shortlist
            .edit(&job_id, &candidate_link, move |record| {
                record.contacted = contacted;
                record.review = review;
                record.email = email;
                record.linkedin = linkedin;
            })
            .await?)
    }

    /// Upload a resume in the background. The outcome is only logged; it never
    /// changes curation state.
    pub fn attach_resume(&self, upload: ResumeUpload) -> Result<JoinHandle<()>, CurationError> {
        required(upload.job_id.as_str(), "job_id")?;
        required(&upload.candidate_link, "candidate_link")?;
        if upload.bytes.is_empty() {
            return Err(CurationError::Validation("resume file is empty".to_string()));
        }

        let gateway = Arc::clone(&self.gateway);
        Ok(tokio::spawn(async move {
            let job_id = upload.job_id.clone();
            let candidate_link = upload.candidate_link.clone();
            match gateway.upload_resume(upload).await {
                Ok(()) => info!(%job_id, %candidate_link, "resume attached"),
                Err(err) => warn!(%job_id, %candidate_link, error = %err, "resume upload failed"),
            }
        }))
    }
}
