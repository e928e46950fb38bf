//! Candidate sourcing and curation.
//!
//! A search is created on the external job-processing service and polled
//! until it finishes. Results are shortlisted into saved candidates that
//! carry a per-job rank, notes and contact annotations. Hiring one candidate
//! closes the job and freezes its shortlist.

pub mod domain;
pub mod export;
pub mod facade;
pub mod gateway;
pub mod hire;
pub mod http;
pub mod locks;
pub mod poller;
pub mod ranking;
pub mod router;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    Annotation, Candidate, CandidateSource, JobGroup, JobId, JobStatus, JobView, Notes,
    NotesError, SavedCandidate, SearchPrompts, SourcingJob, StructuredJd,
};
pub use export::write_groups_csv;
pub use facade::{ActiveSearch, CurationError, CurationFacade};
pub use gateway::{GatewayError, ResumeUpload, SourcingGateway};
pub use http::HttpSourcingGateway;
pub use poller::{PollCompletion, PollOutcome, DEFAULT_POLL_INTERVAL};
pub use router::curation_router;
pub use store::{JobSnapshot, JobStore, SnapshotKind};
