//! End-to-end curation scenarios through the public facade and the reqwest
//! gateway, against an in-process stand-in for the sourcing service.

mod stub {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[derive(Default)]
    pub struct StubState {
        pub jobs: Vec<Value>,
        pub results: HashMap<String, VecDeque<(StatusCode, Value)>>,
        pub saved: Vec<Value>,
        pub status_queries: Vec<(String, String)>,
    }

    pub type Shared = Arc<Mutex<StubState>>;

    fn same_key(record: &Value, job_id: &str, link: &str) -> bool {
        record["job_id"] == job_id && record["candidate_link"] == link
    }

    async fn create_job(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        let mut state = state.lock().expect("stub mutex poisoned");
        let job_id = format!("job-{}", state.jobs.len() + 1);
        let mut job = body.clone();
        job["job_id"] = json!(job_id);
        job["status"] = json!("pending");
        job["created_at"] = json!("2025-03-01T10:15:00");
        state.jobs.insert(0, job);
        Json(json!({ "job_id": job_id, "status": "pending", "message": "Sourcing job created" }))
    }

    async fn list_jobs(State(state): State<Shared>) -> Json<Value> {
        let state = state.lock().expect("stub mutex poisoned");
        Json(json!({ "jobs": state.jobs }))
    }

    async fn job(
        State(state): State<Shared>,
        Path(job_id): Path<String>,
    ) -> (StatusCode, Json<Value>) {
        let state = state.lock().expect("stub mutex poisoned");
        match state.jobs.iter().find(|job| job["job_id"] == job_id.as_str()) {
            Some(job) => (StatusCode::OK, Json(job.clone())),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": "Job not found" })),
            ),
        }
    }

    async fn results(
        State(state): State<Shared>,
        Path(job_id): Path<String>,
    ) -> (StatusCode, Json<Value>) {
        let mut state = state.lock().expect("stub mutex poisoned");
        match state.results.get_mut(&job_id) {
            Some(queue) if queue.len() > 1 => {
                let (status, body) = queue.pop_front().expect("queued response");
                (status, Json(body))
            }
            Some(queue) => {
                let (status, body) = queue.front().cloned().expect("queued response");
                (status, Json(body))
            }
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": "Job not found" })),
            ),
        }
    }

    async fn set_status(
        State(state): State<Shared>,
        Path(job_id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        let Some(status) = query.get("status").cloned() else {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": "status query parameter required" })),
            );
        };
        let mut state = state.lock().expect("stub mutex poisoned");
        state.status_queries.push((job_id.clone(), status.clone()));
        for job in state.jobs.iter_mut() {
            if job["job_id"] == job_id.as_str() {
                job["status"] = json!(status);
            }
        }
        (StatusCode::OK, Json(json!({ "message": "Status updated" })))
    }

    async fn create_saved(
        State(state): State<Shared>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let mut state = state.lock().expect("stub mutex poisoned");
        let job_id = body["job_id"].as_str().unwrap_or_default().to_string();
        let link = body["candidate_link"].as_str().unwrap_or_default().to_string();
        if state.saved.iter().any(|record| same_key(record, &job_id, &link)) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "Candidate already saved" })),
            );
        }
        state.saved.push(body);
        (StatusCode::OK, Json(json!({ "message": "Saved" })))
    }

    async fn upsert_saved(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        let mut state = state.lock().expect("stub mutex poisoned");
        let job_id = body["job_id"].as_str().unwrap_or_default().to_string();
        let link = body["candidate_link"].as_str().unwrap_or_default().to_string();
        match state
            .saved
            .iter_mut()
            .find(|record| same_key(record, &job_id, &link))
        {
            Some(record) => *record = body,
            None => state.saved.push(body),
        }
        Json(json!({ "message": "Updated" }))
    }

    async fn delete_saved(
        State(state): State<Shared>,
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        let mut state = state.lock().expect("stub mutex poisoned");
        let job_id = query.get("job_id").cloned().unwrap_or_default();
        let link = query.get("candidate_link").cloned().unwrap_or_default();
        let before = state.saved.len();
        state
            .saved
            .retain(|record| !same_key(record, &job_id, &link));
        if state.saved.len() == before {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": "Saved candidate not found" })),
            );
        }
        (StatusCode::OK, Json(json!({ "message": "Deleted" })))
    }

    async fn list_saved(
        State(state): State<Shared>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let state = state.lock().expect("stub mutex poisoned");
        let items: Vec<Value> = state
            .saved
            .iter()
            .filter(|record| {
                query
                    .get("job_id")
                    .map_or(true, |job_id| record["job_id"] == job_id.as_str())
            })
            .cloned()
            .collect();
        Json(json!({ "total": items.len(), "items": items }))
    }

    async fn grouped(State(state): State<Shared>) -> Json<Value> {
        let state = state.lock().expect("stub mutex poisoned");
        let mut groups: serde_json::Map<String, Value> = serde_json::Map::new();
        for record in &state.saved {
            let title = record["job_title"]
                .as_str()
                .unwrap_or("Untitled Job")
                .to_string();
            let entry = groups.entry(title).or_insert_with(|| json!([]));
            if let Some(items) = entry.as_array_mut() {
                items.push(record.clone());
            }
        }
        Json(json!({ "group_count": groups.len(), "groups": groups }))
    }

    pub async fn spawn(state: Shared) -> String {
        let router = Router::new()
            .route("/sourcing-jobs", post(create_job).get(list_jobs))
            .route("/sourcing-jobs/:job_id", get(job))
            .route("/sourcing-jobs/:job_id/results", get(results))
            .route("/sourcing-jobs/:job_id/status", put(set_status))
            .route(
                "/saved-candidates",
                post(create_saved)
                    .put(upsert_saved)
                    .delete(delete_saved)
                    .get(list_saved),
            )
            .route("/saved-candidates/grouped", get(grouped))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("stub server");
        });
        format!("http://{addr}")
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use talent_pipeline::config::SourcingServiceConfig;
use talent_pipeline::workflows::sourcing::{
    Candidate, CandidateSource, CurationError, CurationFacade, HttpSourcingGateway, JobId,
    JobStatus, PollOutcome, SearchPrompts, SnapshotKind,
};

fn candidate(link: &str, score: u8) -> Candidate {
    Candidate {
        link: link.to_string(),
        name: format!("Engineer {link}"),
        source: CandidateSource::GitHub,
        match_score: score,
        snippet: "Maintains a tokio-based proxy".to_string(),
        reasoning: "Production async Rust".to_string(),
    }
}

async fn facade(state: stub::Shared) -> CurationFacade<HttpSourcingGateway> {
    let base_url = stub::spawn(state).await;
    let config = SourcingServiceConfig {
        resume_proxy_url: base_url.clone(),
        base_url,
        poll_interval: Duration::from_millis(20),
        request_timeout: Duration::from_secs(5),
    };
    let gateway = HttpSourcingGateway::new(&config).expect("gateway builds");
    CurationFacade::new(Arc::new(gateway), config.poll_interval)
}

#[tokio::test]
async fn search_streams_partial_results_then_completes() {
    let state = stub::Shared::default();
    state.lock().expect("stub mutex").results.insert(
        "job-1".to_string(),
        [
            (
                StatusCode::OK,
                json!({
                    "status": "running",
                    "candidate_count": 1,
                    "candidates": [{ "link": "https://github.com/a", "name": "A", "source": "github", "match_score": null }],
                }),
            ),
            (
                StatusCode::OK,
                json!({
                    "status": "completed",
                    "candidate_count": 2,
                    "candidates": [
                        { "link": "https://github.com/a", "name": "A", "source": "github", "match_score": 81 },
                        { "link": "https://github.com/b", "name": "B", "source": "github", "match_score": 64 },
                    ],
                }),
            ),
        ]
        .into_iter()
        .collect(),
    );
    let facade = facade(Arc::clone(&state)).await;
    let mut events = facade.store().subscribe();

    let search = facade
        .create_search(
            SearchPrompts {
                linkedin_prompt: None,
                github_prompt: Some("Rust network engineer with tokio".to_string()),
            },
            None,
        )
        .await
        .expect("search created");
    let outcome = search.completion.wait().await;

    let first = events.recv().await.expect("partial results");
    assert_eq!(first.kind, SnapshotKind::Intermediate);
    assert_eq!(first.candidates[0].match_score, 0);
    match outcome {
        PollOutcome::Completed(snapshot) => {
            assert_eq!(snapshot.status, JobStatus::Completed);
            assert_eq!(snapshot.candidate_count, 2);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let history = facade.list_jobs().await.expect("history");
    assert_eq!(history[0].job_id, JobId::from("job-1"));
    assert_eq!(history[0].display_title(), "Rust network engineer");
}

#[tokio::test]
async fn failed_job_detail_reaches_the_caller() {
    let state = stub::Shared::default();
    state.lock().expect("stub mutex").results.insert(
        "job-7".to_string(),
        [(
            StatusCode::BAD_REQUEST,
            json!({ "detail": "Job failed: LinkedIn quota exhausted" }),
        )]
        .into_iter()
        .collect(),
    );
    let facade = facade(state).await;

    let outcome = facade.poll("job-7").expect("poll started").wait().await;

    assert_eq!(
        outcome,
        PollOutcome::Failed {
            job_id: JobId::from("job-7"),
            detail: Some("Job failed: LinkedIn quota exhausted".to_string()),
        }
    );
    let missing = facade.poll("job-404").expect("poll started").wait().await;
    assert_eq!(
        missing,
        PollOutcome::JobNotFound {
            job_id: JobId::from("job-404"),
        }
    );
}

#[tokio::test]
async fn hired_job_from_history_stops_polling_and_loads() {
    let state = stub::Shared::default();
    {
        let mut stub = state.lock().expect("stub mutex");
        stub.jobs.push(json!({
            "job_id": "job-hired",
            "status": "hired",
            "linkedin_prompt": "Data Engineer in Lisbon",
            "candidate_count": 4,
            "created_at": "2025-02-11T08:00:00",
        }));
        stub.results.insert(
            "job-hired".to_string(),
            [(
                StatusCode::BAD_REQUEST,
                json!({ "detail": "Unknown job status: hired" }),
            )]
            .into_iter()
            .collect(),
        );
    }
    let facade = facade(state).await;
    let job_id = JobId::from("job-hired");

    let completion = facade.poll(job_id.as_str()).expect("poll started");
    let outcome = tokio::time::timeout(Duration::from_secs(5), completion.wait())
        .await
        .expect("poll stops on a hired job");

    match outcome {
        PollOutcome::Completed(snapshot) => {
            assert_eq!(snapshot.status, JobStatus::Hired);
            assert_eq!(snapshot.candidate_count, 4);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!facade.is_polling(&job_id));

    let view = facade.load_job(job_id.as_str()).await.expect("hired job loads");
    assert_eq!(view.job.status, JobStatus::Hired);
    assert_eq!(view.job.display_title(), "Data Engineer");
    assert!(view.candidates.is_empty());
}

#[tokio::test]
async fn shortlist_is_ranked_annotated_and_locked_by_hire() {
    let state: stub::Shared = Arc::new(Mutex::new(stub::StubState::default()));
    let facade = facade(Arc::clone(&state)).await;
    let search = facade
        .create_search(SearchPrompts::linkedin("Site Reliability Engineer in Austin"), None)
        .await
        .expect("search created");
    facade
        .cancel_poll(search.job_id.as_str())
        .expect("poll cancelled");
    let job_id = search.job_id.as_str();

    for (link, score) in [("x", 90), ("y", 80), ("z", 70)] {
        facade
            .save(job_id, &candidate(link, score))
            .await
            .expect("saved");
    }
    let records = facade.reorder(job_id, "z", 0).await.expect("reordered");
    let order: Vec<(&str, Option<u32>)> = records
        .iter()
        .map(|record| (record.candidate_link.as_str(), record.rank))
        .collect();
    assert_eq!(order, vec![("z", Some(0)), ("x", Some(1)), ("y", Some(2))]);

    facade
        .update_notes(job_id, "x", ["• solid on-call stories", "• asks good questions"])
        .await
        .expect("notes saved");
    let stored_notes = state.lock().expect("stub mutex").saved[0]["notes"].clone();
    assert_eq!(
        stored_notes,
        json!("solid on-call stories\nasks good questions")
    );

    let duplicate = facade.save(job_id, &candidate("x", 90)).await;
    assert!(matches!(duplicate, Err(CurationError::DuplicateSave { .. })));

    facade.hire(job_id, "x").await.expect("hired");
    assert_eq!(
        state.lock().expect("stub mutex").status_queries,
        vec![(job_id.to_string(), "hired".to_string())]
    );
    let locked = facade.reorder(job_id, "y", 0).await;
    assert!(matches!(locked, Err(CurationError::Locked { .. })));

    let groups = facade.load_groups().await.expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].title, "Site Reliability Engineer");
    let links: Vec<&str> = groups[0]
        .candidates
        .iter()
        .map(|record| record.candidate_link.as_str())
        .collect();
    assert_eq!(links, vec!["z", "x", "y"]);
    assert!(groups[0].candidates[1].hired);
}
