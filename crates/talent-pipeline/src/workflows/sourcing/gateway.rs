use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{
    Candidate, JobId, JobStatus, SavedCandidate, SearchPrompts, SourcingJob, StructuredJd,
};

/// Body of `POST /sourcing-jobs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateJobRequest {
    #[serde(flatten)]
    pub prompts: SearchPrompts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_jd: Option<StructuredJd>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `GET /sourcing-jobs/{job_id}/results`. Candidates are present while
/// the job is still running, so callers can show partial results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    pub status: JobStatus,
    #[serde(default)]
    pub candidate_count: u32,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_details: Option<SourcingJob>,
}

impl JobResults {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            candidate_count: 0,
            candidates: Vec::new(),
            detail: Some(detail.into()),
            job_details: None,
        }
    }

    /// Results built from the job record alone, for statuses the results
    /// endpoint does not report. Carries no candidates.
    pub fn from_job(job: SourcingJob) -> Self {
        Self {
            status: job.status,
            candidate_count: job.candidate_count,
            candidates: Vec::new(),
            detail: None,
            job_details: Some(job),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct JobList {
    #[serde(default)]
    pub(crate) jobs: Vec<SourcingJob>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SavedCandidateList {
    #[serde(default)]
    pub(crate) items: Vec<SavedCandidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SavedCandidateGroups {
    #[serde(default)]
    pub(crate) groups: BTreeMap<String, Vec<SavedCandidate>>,
}

/// Resume file handed to the upload proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeUpload {
    pub job_id: JobId,
    pub candidate_link: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Narrow contract with the external job-processing service and the
/// resume-upload proxy.
#[async_trait]
pub trait SourcingGateway: Send + Sync {
    async fn create_job(&self, request: CreateJobRequest)
        -> Result<CreateJobResponse, GatewayError>;
    async fn job_results(&self, job_id: &JobId) -> Result<JobResults, GatewayError>;
    /// The job record, `GET /sourcing-jobs/{job_id}`.
    async fn job(&self, job_id: &JobId) -> Result<SourcingJob, GatewayError>;
    async fn list_jobs(&self) -> Result<Vec<SourcingJob>, GatewayError>;
    async fn set_job_status(&self, job_id: &JobId, status: JobStatus)
        -> Result<(), GatewayError>;

    async fn create_saved(&self, record: &SavedCandidate) -> Result<(), GatewayError>;
    /// Upsert keyed by (`job_id`, `candidate_link`).
    async fn update_saved(&self, record: &SavedCandidate) -> Result<(), GatewayError>;
    async fn delete_saved(&self, job_id: &JobId, candidate_link: &str)
        -> Result<(), GatewayError>;
    async fn list_saved(&self, job_id: Option<&JobId>)
        -> Result<Vec<SavedCandidate>, GatewayError>;
    async fn list_saved_grouped(
        &self,
    ) -> Result<BTreeMap<String, Vec<SavedCandidate>>, GatewayError>;

    async fn upload_resume(&self, upload: ResumeUpload) -> Result<(), GatewayError>;
}

/// Failure talking to the external service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("not found: {detail}")]
    NotFound { detail: String },
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("sourcing service error ({status}): {detail}")]
    Service { status: u16, detail: String },
    #[error("network error: {0}")]
    Transient(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}
