use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Annotation, Candidate, JobId, SearchPrompts, StructuredJd};
use super::facade::{CurationError, CurationFacade};
use super::gateway::SourcingGateway;

/// HTTP status used when a [`CurationError`] reaches the UI.
pub fn status_for(error: &CurationError) -> StatusCode {
    match error {
        CurationError::Validation(_) | CurationError::InvalidRank { .. } => {
            StatusCode::BAD_REQUEST
        }
        CurationError::NotFound(_) | CurationError::JobNotFound { .. } => StatusCode::NOT_FOUND,
        CurationError::AlreadyPolling { .. }
        | CurationError::AlreadyHiring { .. }
        | CurationError::DuplicateSave { .. }
        | CurationError::AlreadyHired { .. } => StatusCode::CONFLICT,
        CurationError::Locked { .. } => StatusCode::LOCKED,
        CurationError::TransientNetwork(_) => StatusCode::SERVICE_UNAVAILABLE,
        CurationError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
        CurationError::PartialHireFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: CurationError) -> Response {
    let payload = json!({
        "error": error.to_string(),
        "kind": error.kind(),
    });
    (status_for(&error), axum::Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, CurationError>) -> Response {
    match result {
        Ok(value) => (status, axum::Json(value)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSearchBody {
    #[serde(flatten)]
    pub prompts: SearchPrompts,
    #[serde(default)]
    pub structured_jd: Option<StructuredJd>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveBody {
    pub job_id: String,
    pub candidate: Candidate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankBody {
    pub job_id: String,
    pub candidate_link: String,
    pub target_rank: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotesBody {
    pub job_id: String,
    pub candidate_link: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationBody {
    pub job_id: String,
    pub candidate_link: String,
    #[serde(flatten)]
    pub annotation: Annotation,
}

/// Identifies one saved candidate; used as body or query string.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateKey {
    pub job_id: String,
    pub candidate_link: String,
}

/// Router exposing the curation facade to the UI layer.
pub fn curation_router<G>(facade: Arc<CurationFacade<G>>) -> Router
where
    G: SourcingGateway + ?Sized + 'static,
{
    Router::new()
        .route(
            "/api/v1/searches",
            post(create_search_handler::<G>).get(list_jobs_handler::<G>),
        )
        .route("/api/v1/searches/:job_id", get(load_job_handler::<G>))
        .route(
            "/api/v1/searches/:job_id/snapshot",
            get(snapshot_handler::<G>),
        )
        .route(
            "/api/v1/searches/:job_id/poll",
            post(poll_handler::<G>).delete(cancel_poll_handler::<G>),
        )
        .route("/api/v1/saved/groups", get(groups_handler::<G>))
        .route(
            "/api/v1/saved",
            post(save_handler::<G>).delete(remove_handler::<G>),
        )
        .route("/api/v1/saved/rank", put(reorder_handler::<G>))
        .route("/api/v1/saved/notes", put(notes_handler::<G>))
        .route("/api/v1/saved/annotations", put(annotate_handler::<G>))
        .route("/api/v1/saved/hire", post(hire_handler::<G>))
        .with_state(facade)
}

pub(crate) async fn create_search_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    axum::Json(body): axum::Json<CreateSearchBody>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    match facade.create_search(body.prompts, body.structured_jd).await {
        Ok(search) => {
            // The loop runs on its own; the UI follows it through snapshots.
            let payload = json!({ "job_id": search.job_id });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_jobs_handler<G>(State(facade): State<Arc<CurationFacade<G>>>) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    respond(StatusCode::OK, facade.list_jobs().await)
}

pub(crate) async fn load_job_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    Path(job_id): Path<String>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    respond(StatusCode::OK, facade.load_job(&job_id).await)
}

pub(crate) async fn snapshot_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    Path(job_id): Path<String>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    let job_id = JobId(job_id);
    match facade.snapshot(&job_id) {
        Some(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        None => error_response(CurationError::NotFound(format!(
            "no results published for job {job_id}"
        ))),
    }
}

pub(crate) async fn poll_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    Path(job_id): Path<String>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    match facade.poll(&job_id) {
        Ok(completion) => {
            let payload = json!({ "job_id": completion.job_id(), "polling": true });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cancel_poll_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    Path(job_id): Path<String>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    match facade.cancel_poll(&job_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn groups_handler<G>(State(facade): State<Arc<CurationFacade<G>>>) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    respond(StatusCode::OK, facade.load_groups().await)
}

pub(crate) async fn save_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    axum::Json(body): axum::Json<SaveBody>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    respond(
        StatusCode::CREATED,
        facade.save(&body.job_id, &body.candidate).await,
    )
}

pub(crate) async fn reorder_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    axum::Json(body): axum::Json<RankBody>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    respond(
        StatusCode::OK,
        facade
            .reorder(&body.job_id, &body.candidate_link, body.target_rank)
            .await,
    )
}

pub(crate) async fn notes_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    axum::Json(body): axum::Json<NotesBody>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    respond(
        StatusCode::OK,
        facade
            .update_notes(&body.job_id, &body.candidate_link, body.notes)
            .await,
    )
}

pub(crate) async fn annotate_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    axum::Json(body): axum::Json<AnnotationBody>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    respond(
        StatusCode::OK,
        facade
            .annotate(&body.job_id, &body.candidate_link, body.annotation)
            .await,
    )
}

pub(crate) async fn remove_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    Query(key): Query<CandidateKey>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    match facade.remove(&key.job_id, &key.candidate_link).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn hire_handler<G>(
    State(facade): State<Arc<CurationFacade<G>>>,
    axum::Json(key): axum::Json<CandidateKey>,
) -> Response
where
    G: SourcingGateway + ?Sized + 'static,
{
    respond(
        StatusCode::OK,
        facade.hire(&key.job_id, &key.candidate_link).await,
    )
}
