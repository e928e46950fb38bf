use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::domain::{JobId, JobStatus, SavedCandidate, SourcingJob};
use super::gateway::{
    CreateJobRequest, CreateJobResponse, GatewayError, JobList, JobResults, ResumeUpload,
    SavedCandidateGroups, SavedCandidateList, SourcingGateway,
};
use crate::config::SourcingServiceConfig;

/// Prefix the sourcing service puts on the detail of a failed job's results.
const JOB_FAILED_PREFIX: &str = "Job failed";

/// Prefix of the 400 detail for statuses the results endpoint does not serve,
/// such as `hired`.
const UNKNOWN_STATUS_PREFIX: &str = "Unknown job status";

/// `reqwest` implementation of [`SourcingGateway`].
#[derive(Debug, Clone)]
pub struct HttpSourcingGateway {
    client: Client,
    base_url: String,
    resume_proxy_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl HttpSourcingGateway {
    pub fn new(config: &SourcingServiceConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| GatewayError::Transient(err.to_string()))?;
        Ok(Self::with_client(
            client,
            &config.base_url,
            &config.resume_proxy_url,
        ))
    }

    pub fn with_client(client: Client, base_url: &str, resume_proxy_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            resume_proxy_url: resume_proxy_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.send(request).await?;
        decode(response).await
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_decode() {
        GatewayError::Malformed(err.to_string())
    } else {
        GatewayError::Transient(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|err| GatewayError::Malformed(err.to_string()))
}

/// Extract FastAPI's `{"detail": ...}` when present, else the raw body.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => "no detail provided".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

async fn status_error(response: Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, error_detail(&body))
}

fn classify_status(status: StatusCode, detail: String) -> GatewayError {
    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound { detail },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            GatewayError::Transient(detail)
        }
        status if status.is_client_error() => GatewayError::Rejected {
            status: status.as_u16(),
            detail,
        },
        status => GatewayError::Service {
            status: status.as_u16(),
            detail,
        },
    }
}

#[async_trait]
impl SourcingGateway for HttpSourcingGateway {
    async fn create_job(
        &self,
        request: CreateJobRequest,
    ) -> Result<CreateJobResponse, GatewayError> {
        self.send_json(self.client.post(self.url("/sourcing-jobs")).json(&request))
            .await
    }

    async fn job_results(&self, job_id: &JobId) -> Result<JobResults, GatewayError> {
        let url = self.url(&format!("/sourcing-jobs/{}/results", job_id));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            return decode(response).await;
        }

        // A failed job is reported as 400 with a "Job failed: ..." detail. A
        // hired job is a 400 too; its status comes from the job record.
        match status_error(response).await {
            GatewayError::Rejected { status: 400, detail }
                if detail.starts_with(JOB_FAILED_PREFIX) =>
            {
                debug!(%job_id, %detail, "sourcing job reported failure");
                Ok(JobResults::failed(detail))
            }
            GatewayError::Rejected { status: 400, detail }
                if detail.starts_with(UNKNOWN_STATUS_PREFIX) =>
            {
                debug!(%job_id, %detail, "results unavailable for status; reading job record");
                let job = self.job(job_id).await?;
                Ok(JobResults::from_job(job))
            }
            other => Err(other),
        }
    }

    async fn job(&self, job_id: &JobId) -> Result<SourcingJob, GatewayError> {
        let url = self.url(&format!("/sourcing-jobs/{}", job_id));
        self.send_json(self.client.get(url)).await
    }

    async fn list_jobs(&self) -> Result<Vec<SourcingJob>, GatewayError> {
        let list: JobList = self
            .send_json(self.client.get(self.url("/sourcing-jobs")))
            .await?;
        Ok(list.jobs)
    }

    async fn set_job_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), GatewayError> {
        let url = self.url(&format!("/sourcing-jobs/{}/status", job_id));
        self.send(
            self.client
                .put(url)
                .query(&[("status", status.label())])
                .json(&serde_json::json!({ "status": status })),
        )
        .await?;
        Ok(())
    }

    async fn create_saved(&self, record: &SavedCandidate) -> Result<(), GatewayError> {
        self.send(self.client.post(self.url("/saved-candidates")).json(record))
            .await?;
        Ok(())
    }

    async fn update_saved(&self, record: &SavedCandidate) -> Result<(), GatewayError> {
        self.send(self.client.put(self.url("/saved-candidates")).json(record))
            .await?;
        Ok(())
    }

    async fn delete_saved(&self, job_id: &JobId, candidate_link: &str) -> Result<(), GatewayError> {
        self.send(
            self.client
                .delete(self.url("/saved-candidates"))
                .query(&[("job_id", job_id.as_str()), ("candidate_link", candidate_link)]),
        )
        .await?;
        Ok(())
    }

    async fn list_saved(
        &self,
        job_id: Option<&JobId>,
    ) -> Result<Vec<SavedCandidate>, GatewayError> {
        let mut request = self.client.get(self.url("/saved-candidates"));
        if let Some(job_id) = job_id {
            request = request.query(&[("job_id", job_id.as_str())]);
        }
        let list: SavedCandidateList = self.send_json(request).await?;
        Ok(list.items)
    }

    async fn list_saved_grouped(
        &self,
    ) -> Result<BTreeMap<String, Vec<SavedCandidate>>, GatewayError> {
        let grouped: SavedCandidateGroups = self
            .send_json(self.client.get(self.url("/saved-candidates/grouped")))
            .await?;
        Ok(grouped.groups)
    }

    async fn upload_resume(&self, upload: ResumeUpload) -> Result<(), GatewayError> {
        let ResumeUpload {
            job_id,
            candidate_link,
            file_name,
            content_type,
            bytes,
        } = upload;

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&content_type)
            .map_err(|err| GatewayError::Rejected {
                status: 400,
                detail: format!("invalid content type '{content_type}': {err}"),
            })?;
        let form = Form::new()
            .part("file", part)
            .text("job_id", job_id.0)
            .text("candidate_link", candidate_link);

        let url = format!("{}/api/saved-candidates/resume", self.resume_proxy_url);
        self.send(self.client.post(url).multipart(form)).await?;
        Ok(())
    }
}
