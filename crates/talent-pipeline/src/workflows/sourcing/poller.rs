use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::domain::{JobId, JobStatus};
use super::gateway::{GatewayError, JobResults, SourcingGateway};
use super::store::{JobSnapshot, JobStore, SnapshotKind};

/// Default tick period between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Generation number identifying one poll loop for a job. A loop may only
/// publish while its token is still the registered one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollToken(u64);

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The job completed (or was already hired); carries the final snapshot.
    Completed(JobSnapshot),
    Failed {
        job_id: JobId,
        detail: Option<String>,
    },
    JobNotFound {
        job_id: JobId,
    },
    /// The loop was cancelled before reaching a terminal state.
    Cancelled,
}

/// Receiver for the single stop signal of a poll loop.
#[derive(Debug)]
pub struct PollCompletion {
    job_id: JobId,
    receiver: oneshot::Receiver<PollOutcome>,
}

impl PollCompletion {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Wait for the loop to stop. A cancelled loop never sends, so a dropped
    /// sender reads as [`PollOutcome::Cancelled`].
    pub async fn wait(self) -> PollOutcome {
        self.receiver.await.unwrap_or(PollOutcome::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollerError {
    #[error("a poll loop is already active for job {job_id}")]
    AlreadyPolling { job_id: JobId },
}

struct ActivePoll {
    token: PollToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct PollRegistry {
    active: Mutex<HashMap<JobId, ActivePoll>>,
    next_token: AtomicU64,
}

impl PollRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, ActivePoll>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_token(&self) -> PollToken {
        PollToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Run `write` only if `token` is still current. The registry lock is held
    /// across the write so a concurrent `cancel` cannot slip in between.
    fn publish_if_current(&self, job_id: &JobId, token: PollToken, write: impl FnOnce()) -> bool {
        let active = self.lock();
        match active.get(job_id) {
            Some(poll) if poll.token == token => {
                write();
                true
            }
            _ => false,
        }
    }

    /// Like [`Self::publish_if_current`] but also retires the loop.
    fn finish_if_current(&self, job_id: &JobId, token: PollToken, write: impl FnOnce()) -> bool {
        let mut active = self.lock();
        match active.get(job_id) {
            Some(poll) if poll.token == token => {
                write();
                // Dropping our own handle detaches; the task is about to return.
                active.remove(job_id);
                true
            }
            _ => false,
        }
    }

    fn cancel(&self, job_id: &JobId) -> bool {
        match self.lock().remove(job_id) {
            Some(poll) => {
                poll.task.abort();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) {
        for (_, poll) in self.lock().drain() {
            poll.task.abort();
        }
    }
}

/// Drives repeated status checks for jobs until they reach a terminal state.
///
/// At most one loop runs per job. Each tick awaits its request before the
/// next tick fires, so requests for a job never overlap.
pub struct JobPoller<G: ?Sized> {
    gateway: Arc<G>,
    store: Arc<JobStore>,
    registry: Arc<PollRegistry>,
    interval: Duration,
}

impl<G> JobPoller<G>
where
    G: SourcingGateway + ?Sized + 'static,
{
    pub fn new(gateway: Arc<G>, store: Arc<JobStore>, interval: Duration) -> Self {
        Self {
            gateway,
            store,
            registry: Arc::new(PollRegistry::default()),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_polling(&self, job_id: &JobId) -> bool {
        self.registry.lock().contains_key(job_id)
    }

    /// Begin polling `job_id`. The first check happens immediately.
    pub fn start(&self, job_id: JobId) -> Result<PollCompletion, PollerError> {
        let mut active = self.registry.lock();
        if active.contains_key(&job_id) {
            return Err(PollerError::AlreadyPolling { job_id });
        }

        let token = self.registry.next_token();
        let (sender, receiver) = oneshot::channel();
        let poll_loop = PollLoop {
            gateway: Arc::clone(&self.gateway),
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            job_id: job_id.clone(),
            token,
            interval: self.interval,
        };
        let task = tokio::spawn(poll_loop.run(sender));
        active.insert(job_id.clone(), ActivePoll { token, task });

        info!(%job_id, interval_secs = self.interval.as_secs_f64(), "started polling sourcing job");
        Ok(PollCompletion { job_id, receiver })
    }

    /// Stop the loop for `job_id`, if any. Safe to call repeatedly; once this
    /// returns no further snapshot for the job reaches the store.
    pub fn cancel(&self, job_id: &JobId) {
        if self.registry.cancel(job_id) {
            info!(%job_id, "cancelled polling for sourcing job");
        }
    }
}

impl<G: ?Sized> Drop for JobPoller<G> {
    fn drop(&mut self) {
        self.registry.cancel_all();
    }
}

struct PollLoop<G: ?Sized> {
    gateway: Arc<G>,
    store: Arc<JobStore>,
    registry: Arc<PollRegistry>,
    job_id: JobId,
    token: PollToken,
    interval: Duration,
}

enum Tick {
    Continue,
    Stop(PollOutcome),
}

impl<G> PollLoop<G>
where
    G: SourcingGateway + ?Sized + 'static,
{
    async fn run(self, sender: oneshot::Sender<PollOutcome>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let response = self.gateway.job_results(&self.job_id).await;
            match self.handle(response) {
                Tick::Continue => {}
                Tick::Stop(outcome) => {
                    // Receiver may be gone if nobody awaits completion.
                    let _ = sender.send(outcome);
                    return;
                }
            }
        }
    }

    fn handle(&self, response: Result<JobResults, GatewayError>) -> Tick {
        let job_id = &self.job_id;
        match response {
            Ok(results) => match results.status {
                JobStatus::Completed | JobStatus::Hired => {
                    let snapshot =
                        JobSnapshot::from_results(job_id.clone(), SnapshotKind::Final, results);
                    let published = snapshot.clone();
                    if !self.finish(|| self.store.apply_snapshot(published)) {
                        return Tick::Stop(PollOutcome::Cancelled);
                    }
                    info!(%job_id, candidates = snapshot.candidate_count, status = %snapshot.status, "sourcing job finished");
                    Tick::Stop(PollOutcome::Completed(snapshot))
                }
                JobStatus::Failed => {
                    let detail = results.detail.clone();
                    let snapshot =
                        JobSnapshot::from_results(job_id.clone(), SnapshotKind::Error, results);
                    if !self.finish(|| self.store.apply_snapshot(snapshot)) {
                        return Tick::Stop(PollOutcome::Cancelled);
                    }
                    warn!(%job_id, detail = detail.as_deref().unwrap_or("unknown"), "sourcing job failed");
                    Tick::Stop(PollOutcome::Failed {
                        job_id: job_id.clone(),
                        detail,
                    })
                }
                JobStatus::Pending | JobStatus::Running => {
                    let status = results.status;
                    let published = if results.candidates.is_empty() {
                        self.registry.publish_if_current(job_id, self.token, || {
                            self.store.record_status(job_id, status)
                        })
                    } else {
                        let snapshot = JobSnapshot::from_results(
                            job_id.clone(),
                            SnapshotKind::Intermediate,
                            results,
                        );
                        debug!(%job_id, candidates = snapshot.candidate_count, "publishing partial results");
                        self.registry.publish_if_current(job_id, self.token, || {
                            self.store.apply_snapshot(snapshot)
                        })
                    };
                    if published {
                        Tick::Continue
                    } else {
                        Tick::Stop(PollOutcome::Cancelled)
                    }
                }
            },
            Err(err) if err.is_not_found() => {
                // Not-found is final: retire the loop without a snapshot.
                if !self.finish(|| ()) {
                    return Tick::Stop(PollOutcome::Cancelled);
                }
                warn!(%job_id, error = %err, "sourcing job unknown to service; stopped polling");
                Tick::Stop(PollOutcome::JobNotFound {
                    job_id: job_id.clone(),
                })
            }
            Err(err) => {
                warn!(%job_id, error = %err, "status check failed; will retry on next tick");
                Tick::Continue
            }
        }
    }

    fn finish(&self, write: impl FnOnce()) -> bool {
        self.registry
            .finish_if_current(&self.job_id, self.token, write)
    }
}
