use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::domain::JobId;

type LockTable = HashMap<JobId, Arc<AsyncMutex<()>>>;

/// One async mutex per job so curation writes for a job run one at a time,
/// each including its confirming reload, while other jobs proceed.
///
/// Entries exist only while someone holds or waits for a job's lock.
#[derive(Debug, Default)]
pub struct JobLocks {
    locks: Mutex<LockTable>,
}

/// Held for the duration of one job mutation.
#[derive(Debug)]
pub struct JobLockGuard<'a> {
    locks: &'a JobLocks,
    job_id: JobId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl JobLocks {
    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn acquire(&self, job_id: &JobId) -> JobLockGuard<'_> {
        let lock = Arc::clone(self.table().entry(job_id.clone()).or_default());
        JobLockGuard {
            locks: self,
            job_id: job_id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of jobs with a held or awaited lock.
    pub fn tracked(&self) -> usize {
        self.table().len()
    }
}

impl Drop for JobLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are only taken under the table lock, so a count of one here
        // means no holder or waiter is left.
        let mut table = self.locks.table();
        if table
            .get(&self.job_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.job_id);
        }
    }
}
