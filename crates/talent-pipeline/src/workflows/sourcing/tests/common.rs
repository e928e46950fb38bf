use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;
use tokio::sync::Notify;

use crate::workflows::sourcing::domain::{
    Candidate, CandidateSource, JobId, JobStatus, SavedCandidate, SearchPrompts, SourcingJob,
    StructuredJd,
};
use crate::workflows::sourcing::gateway::{
    CreateJobRequest, CreateJobResponse, GatewayError, JobResults, ResumeUpload, SourcingGateway,
};
use crate::workflows::sourcing::CurationFacade;

pub(super) const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub(super) fn candidate(link: &str, score: u8) -> Candidate {
    Candidate {
        link: link.to_string(),
        name: format!("Candidate {link}"),
        source: CandidateSource::LinkedIn,
        match_score: score,
        snippet: "Rust, tokio, distributed systems".to_string(),
        reasoning: "Strong backend background".to_string(),
    }
}

pub(super) fn running(candidates: Vec<Candidate>) -> JobResults {
    JobResults {
        status: JobStatus::Running,
        candidate_count: candidates.len() as u32,
        candidates,
        detail: None,
        job_details: None,
    }
}

pub(super) fn completed(candidates: Vec<Candidate>) -> JobResults {
    JobResults {
        status: JobStatus::Completed,
        ..running(candidates)
    }
}

pub(super) fn prompts() -> SearchPrompts {
    SearchPrompts::linkedin("Senior Rust Engineer with async experience in Berlin")
}

pub(super) fn structured_jd(title: &str) -> StructuredJd {
    StructuredJd {
        job_title: Some(title.to_string()),
        ..StructuredJd::default()
    }
}

pub(super) fn ranks(records: &[SavedCandidate]) -> Vec<(String, Option<u32>)> {
    records
        .iter()
        .map(|record| (record.candidate_link.clone(), record.rank))
        .collect()
}

/// Pauses a gateway call until released, so tests can act while a request
/// is in flight.
#[derive(Default)]
pub(super) struct Gate {
    pub(super) entered: Notify,
    pub(super) release: Notify,
}

#[derive(Default)]
struct FakeState {
    next_job: u32,
    jobs: Vec<SourcingJob>,
    results: HashMap<JobId, VecDeque<Result<JobResults, GatewayError>>>,
    saved: Vec<SavedCandidate>,
    calls: Vec<String>,
    uploads: Vec<ResumeUpload>,
    fail_hired_flag: bool,
    fail_all: Option<GatewayError>,
    update_failure: Option<(usize, GatewayError)>,
}

/// In-memory stand-in for the sourcing service and the saved-candidate store.
#[derive(Default)]
pub(super) struct FakeGateway {
    state: Mutex<FakeState>,
    results_gate: Mutex<Option<Arc<Gate>>>,
    status_gate: Mutex<Option<Arc<Gate>>>,
}

impl FakeGateway {
    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake gateway mutex poisoned")
    }

    fn record_call(&self, call: impl Into<String>) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.calls.push(call.into());
        match &state.fail_all {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Queue status responses for a job. The last one repeats; with nothing
    /// queued the job is unknown.
    pub(super) fn script_results(
        &self,
        job_id: &str,
        responses: Vec<Result<JobResults, GatewayError>>,
    ) {
        self.lock()
            .results
            .insert(JobId::from(job_id), responses.into_iter().collect());
    }

    pub(super) fn insert_job(&self, job: SourcingJob) {
        self.lock().jobs.push(job);
    }

    pub(super) fn seed_saved(&self, record: SavedCandidate) {
        self.lock().saved.push(record);
    }

    pub(super) fn saved_for(&self, job_id: &str) -> Vec<SavedCandidate> {
        self.lock()
            .saved
            .iter()
            .filter(|record| record.job_id.as_str() == job_id)
            .cloned()
            .collect()
    }

    pub(super) fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.lock()
            .jobs
            .iter()
            .find(|job| job.job_id.as_str() == job_id)
            .map(|job| job.status)
    }

    pub(super) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(super) fn count_calls(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub(super) fn uploads(&self) -> Vec<ResumeUpload> {
        self.lock().uploads.clone()
    }

    /// Make every upsert that flags a candidate as hired fail.
    pub(super) fn fail_hired_flag(&self) {
        self.lock().fail_hired_flag = true;
    }

    /// Fail the `nth` upsert from now on (1-based), once.
    pub(super) fn fail_nth_update(&self, nth: usize, error: GatewayError) {
        self.lock().update_failure = Some((nth, error));
    }

    pub(super) fn fail_all(&self, error: GatewayError) {
        self.lock().fail_all = Some(error);
    }

    pub(super) fn gate_results(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.results_gate.lock().expect("gate mutex poisoned") = Some(Arc::clone(&gate));
        gate
    }

    pub(super) fn gate_status(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.status_gate.lock().expect("gate mutex poisoned") = Some(Arc::clone(&gate));
        gate
    }

    async fn pass(gate: &Mutex<Option<Arc<Gate>>>) {
        let gate = gate.lock().expect("gate mutex poisoned").clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl SourcingGateway for FakeGateway {
    async fn create_job(
        &self,
        request: CreateJobRequest,
    ) -> Result<CreateJobResponse, GatewayError> {
        self.record_call("create_job")?;
        let mut state = self.lock();
        state.next_job += 1;
        let job_id = JobId(format!("job-{}", state.next_job));
        state.jobs.push(SourcingJob::pending(
            job_id.clone(),
            request.prompts,
            request.structured_jd,
        ));
        Ok(CreateJobResponse {
            job_id,
            status: Some(JobStatus::Pending),
            message: None,
        })
    }

    async fn job_results(&self, job_id: &JobId) -> Result<JobResults, GatewayError> {
        self.record_call(format!("job_results:{job_id}"))?;
        Self::pass(&self.results_gate).await;

        let mut state = self.lock();
        let queue = state.results.get_mut(job_id);
        match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| {
                Err(GatewayError::NotFound {
                    detail: "Job not found".to_string(),
                })
            }),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Err(GatewayError::NotFound {
                detail: "Job not found".to_string(),
            }),
        }
    }

    async fn job(&self, job_id: &JobId) -> Result<SourcingJob, GatewayError> {
        self.record_call(format!("job:{job_id}"))?;
        self.lock()
            .jobs
            .iter()
            .find(|job| &job.job_id == job_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                detail: "Job not found".to_string(),
            })
    }

    async fn list_jobs(&self) -> Result<Vec<SourcingJob>, GatewayError> {
        self.record_call("list_jobs")?;
        Ok(self.lock().jobs.iter().rev().cloned().collect())
    }

    async fn set_job_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), GatewayError> {
        self.record_call(format!("set_job_status:{job_id}:{status}"))?;
        Self::pass(&self.status_gate).await;

        let mut state = self.lock();
        match state.jobs.iter_mut().find(|job| &job.job_id == job_id) {
            Some(job) => {
                job.status = status;
                Ok(())
            }
            None => {
                let mut job = SourcingJob::pending(job_id.clone(), SearchPrompts::default(), None);
                job.status = status;
                state.jobs.push(job);
                Ok(())
            }
        }
    }

    async fn create_saved(&self, record: &SavedCandidate) -> Result<(), GatewayError> {
        self.record_call(format!("create_saved:{}", record.candidate_link))?;
        let mut state = self.lock();
        let exists = state.saved.iter().any(|existing| {
            existing.job_id == record.job_id && existing.candidate_link == record.candidate_link
        });
        if exists {
            return Err(GatewayError::Rejected {
                status: 400,
                detail: "Candidate already saved".to_string(),
            });
        }
        state.saved.push(record.clone());
        Ok(())
    }

    async fn update_saved(&self, record: &SavedCandidate) -> Result<(), GatewayError> {
        self.record_call(format!("update_saved:{}", record.candidate_link))?;
        let mut state = self.lock();
        if let Some((remaining, error)) = state.update_failure.take() {
            if remaining <= 1 {
                return Err(error);
            }
            state.update_failure = Some((remaining - 1, error));
        }
        if record.hired && state.fail_hired_flag {
            return Err(GatewayError::Service {
                status: 500,
                detail: "write timed out".to_string(),
            });
        }
        match state.saved.iter_mut().find(|existing| {
            existing.job_id == record.job_id && existing.candidate_link == record.candidate_link
        }) {
            Some(existing) => *existing = record.clone(),
            None => state.saved.push(record.clone()),
        }
        Ok(())
    }

    async fn delete_saved(&self, job_id: &JobId, candidate_link: &str) -> Result<(), GatewayError> {
        self.record_call(format!("delete_saved:{candidate_link}"))?;
        let mut state = self.lock();
        let before = state.saved.len();
        state
            .saved
            .retain(|record| !(&record.job_id == job_id && record.candidate_link == candidate_link));
        if state.saved.len() == before {
            return Err(GatewayError::NotFound {
                detail: "Saved candidate not found".to_string(),
            });
        }
        Ok(())
    }

    async fn list_saved(
        &self,
        job_id: Option<&JobId>,
    ) -> Result<Vec<SavedCandidate>, GatewayError> {
        self.record_call("list_saved")?;
        Ok(self
            .lock()
            .saved
            .iter()
            .filter(|record| job_id.map_or(true, |job_id| &record.job_id == job_id))
            .cloned()
            .collect())
    }

    async fn list_saved_grouped(
        &self,
    ) -> Result<BTreeMap<String, Vec<SavedCandidate>>, GatewayError> {
        self.record_call("list_saved_grouped")?;
        let mut groups: BTreeMap<String, Vec<SavedCandidate>> = BTreeMap::new();
        for record in self.lock().saved.iter() {
            groups
                .entry(record.title().to_string())
                .or_default()
                .push(record.clone());
        }
        Ok(groups)
    }

    async fn upload_resume(&self, upload: ResumeUpload) -> Result<(), GatewayError> {
        self.record_call(format!("upload_resume:{}", upload.candidate_link))?;
        self.lock().uploads.push(upload);
        Ok(())
    }
}

pub(super) fn build_facade() -> (Arc<CurationFacade<FakeGateway>>, Arc<FakeGateway>) {
    let gateway = Arc::new(FakeGateway::default());
    let facade = Arc::new(CurationFacade::new(Arc::clone(&gateway), POLL_INTERVAL));
    (facade, gateway)
}

/// Facade with a completed job already known to the store, ready for curation.
pub(super) async fn facade_with_job(
    title: &str,
) -> (Arc<CurationFacade<FakeGateway>>, Arc<FakeGateway>, JobId) {
    let (facade, gateway) = build_facade();
    let search = facade
        .create_search(prompts(), Some(structured_jd(title)))
        .await
        .expect("search created");
    facade
        .cancel_poll(search.job_id.as_str())
        .expect("poll cancelled");
    (facade, gateway, search.job_id)
}

pub(super) async fn save_all(
    facade: &CurationFacade<FakeGateway>,
    job_id: &JobId,
    links: &[&str],
) -> Vec<SavedCandidate> {
    let mut records = Vec::new();
    for (index, link) in links.iter().enumerate() {
        records = facade
            .save(job_id.as_str(), &candidate(link, 90 - index as u8))
            .await
            .expect("candidate saved");
    }
    records
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
