use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::domain::{JobGroup, JobId, JobStatus, SavedCandidate};
use super::gateway::{GatewayError, SourcingGateway};
use super::locks::JobLocks;
use super::store::JobStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankError {
    #[error("candidate {candidate_link} is already saved for job {job_id}")]
    DuplicateSave {
        job_id: JobId,
        candidate_link: String,
    },
    #[error("candidate {candidate_link} is not saved for job {job_id}")]
    NotFound {
        job_id: JobId,
        candidate_link: String,
    },
    #[error("rank {target_rank} is outside 0..{limit}")]
    InvalidRank { target_rank: i64, limit: u32 },
    #[error("job {job_id} has a hire decision; its shortlist is locked")]
    Locked { job_id: JobId },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Saved candidates in display order: ascending rank, unranked last, ties kept
/// in the order the store returned them.
pub fn display_order(records: &[SavedCandidate]) -> Vec<SavedCandidate> {
    let mut ordered = records.to_vec();
    ordered.sort_by_key(|record| (record.rank.is_none(), record.rank));
    ordered
}

/// Rank for a newly saved candidate: one past the highest rank in use.
pub fn next_rank(records: &[SavedCandidate]) -> u32 {
    records
        .iter()
        .filter_map(|record| record.rank)
        .max()
        .map_or(0, |rank| rank + 1)
}

/// Exclusive upper bound for a reorder target: any rank up to the highest in
/// use, or one past it for a candidate that has no rank yet.
pub fn rank_limit(records: &[SavedCandidate], moving: &SavedCandidate) -> u32 {
    let limit = next_rank(records);
    if moving.rank.is_none() {
        limit + 1
    } else {
        limit
    }
}

/// Move `moving` to rank `target` and return the records whose rank changes,
/// already carrying their new rank.
///
/// Candidates ranked between the old and the new rank shift one step toward
/// the vacated rank. Every other rank, gaps included, stays as it is. An
/// unranked candidate enters from one past the highest rank.
pub fn shift_reorder(
    records: &[SavedCandidate],
    moving: &SavedCandidate,
    target: u32,
) -> Vec<SavedCandidate> {
    let old = moving.rank.unwrap_or_else(|| next_rank(records));
    if moving.rank == Some(target) {
        return Vec::new();
    }

    let mut changed: Vec<SavedCandidate> = records
        .iter()
        .filter(|record| record.candidate_link != moving.candidate_link)
        .filter_map(|record| {
            let rank = record.rank?;
            let shifted = if target < old && (target..old).contains(&rank) {
                rank + 1
            } else if target > old && (old + 1..=target).contains(&rank) {
                rank - 1
            } else {
                return None;
            };
            let mut record = record.clone();
            record.rank = Some(shifted);
            Some(record)
        })
        .collect();

    let mut moved = moving.clone();
    moved.rank = Some(target);
    changed.push(moved);
    changed
}

/// Group saved candidates by job title, each group in display order. Groups
/// come back sorted by title.
pub fn group_by_title(records: &[SavedCandidate]) -> Vec<JobGroup> {
    let mut grouped: BTreeMap<String, Vec<SavedCandidate>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.title().to_string())
            .or_default()
            .push(record.clone());
    }

    grouped
        .into_iter()
        .map(|(title, candidates)| JobGroup {
            candidates: display_order(&candidates),
            title,
        })
        .collect()
}

/// Maintains the per-job ordered shortlist of saved candidates.
///
/// Every mutation holds the job's lock, writes through the gateway, then
/// reloads the job's saved set so callers see server-confirmed state.
pub struct CandidateRankEngine<G: ?Sized> {
    gateway: Arc<G>,
    store: Arc<JobStore>,
    locks: Arc<JobLocks>,
}

impl<G> CandidateRankEngine<G>
where
    G: SourcingGateway + ?Sized,
{
    pub fn new(gateway: Arc<G>, store: Arc<JobStore>, locks: Arc<JobLocks>) -> Self {
        Self {
            gateway,
            store,
            locks,
        }
    }

    /// Fetch the job's saved set from the external store and cache it.
    pub async fn reload(&self, job_id: &JobId) -> Result<Vec<SavedCandidate>, GatewayError> {
        let records = self.gateway.list_saved(Some(job_id)).await?;
        self.store.replace_saved(job_id, records.clone());
        Ok(display_order(&records))
    }

    /// Append `record` to its job's shortlist with the next free rank.
    pub async fn save(&self, mut record: SavedCandidate) -> Result<Vec<SavedCandidate>, RankError> {
        let job_id = record.job_id.clone();
        let _guard = self.locks.acquire(&job_id).await;

        let existing = self.reload(&job_id).await?;
        if find(&existing, &record.candidate_link).is_some() {
            return Err(RankError::DuplicateSave {
                job_id,
                candidate_link: record.candidate_link,
            });
        }

        record.rank = Some(next_rank(&existing));
        record.hired = false;
        let written = self.gateway.create_saved(&record).await;
        if written.is_ok() {
            info!(%job_id, candidate_link = %record.candidate_link, rank = ?record.rank, "saved candidate");
        }
        self.confirm(&job_id, written).await
    }

    /// Drag-and-drop style move of one candidate to `target_rank`.
    ///
    /// If a write fails part way, the records already moved are put back and
    /// the saved set is reloaded before the error is returned.
    pub async fn reorder(
        &self,
        job_id: &JobId,
        candidate_link: &str,
        target_rank: i64,
    ) -> Result<Vec<SavedCandidate>, RankError> {
        let _guard = self.locks.acquire(job_id).await;

        let records = self.reload(job_id).await?;
        let moving = find(&records, candidate_link)
            .cloned()
            .ok_or_else(|| RankError::NotFound {
                job_id: job_id.clone(),
                candidate_link: candidate_link.to_string(),
            })?;
        let limit = rank_limit(&records, &moving);
        let target = u32::try_from(target_rank)
            .ok()
            .filter(|target| *target < limit)
            .ok_or(RankError::InvalidRank { target_rank, limit })?;
        self.ensure_unlocked(job_id, &records).await?;

        let changed = shift_reorder(&records, &moving, target);
        debug!(%job_id, candidate_link, from = ?moving.rank, to = target, changed = changed.len(), "reordering shortlist");
        for (written, record) in changed.iter().enumerate() {
            if let Err(err) = self.gateway.update_saved(record).await {
                warn!(%job_id, candidate_link = %record.candidate_link, error = %err, "reorder write failed; restoring previous ranks");
                self.restore(&records, &changed[..written]).await;
                return self.confirm(job_id, Err(err)).await;
            }
        }

        self.confirm(job_id, Ok(())).await
    }

    /// Delete a saved candidate. Remaining ranks are left as they are.
    pub async fn remove(
        &self,
        job_id: &JobId,
        candidate_link: &str,
    ) -> Result<Vec<SavedCandidate>, RankError> {
        let _guard = self.locks.acquire(job_id).await;

        let existing = self.reload(job_id).await?;
        if find(&existing, candidate_link).is_none() {
            return Err(RankError::NotFound {
                job_id: job_id.clone(),
                candidate_link: candidate_link.to_string(),
            });
        }
        self.ensure_unlocked(job_id, &existing).await?;

        let deleted = self.gateway.delete_saved(job_id, candidate_link).await;
        if deleted.is_ok() {
            info!(%job_id, candidate_link, "removed saved candidate");
        }
        self.confirm(job_id, deleted).await
    }

    /// Apply `change` to one saved record and write it back. Used for notes and
    /// annotations, which stay editable after a hire.
    pub async fn edit<F>(
        &self,
        job_id: &JobId,
        candidate_link: &str,
        change: F,
    ) -> Result<Vec<SavedCandidate>, RankError>
    where
        F: FnOnce(&mut SavedCandidate) + Send,
    {
        let _guard = self.locks.acquire(job_id).await;

        let existing = self.reload(job_id).await?;
        let mut record = find(&existing, candidate_link)
            .cloned()
            .ok_or_else(|| RankError::NotFound {
                job_id: job_id.clone(),
                candidate_link: candidate_link.to_string(),
            })?;
        change(&mut record);
        let written = self.gateway.update_saved(&record).await;
        self.confirm(job_id, written).await
    }

    /// All saved candidates grouped by job title.
    pub async fn group_by_title(&self) -> Result<Vec<JobGroup>, GatewayError> {
        let grouped = self.gateway.list_saved_grouped().await?;
        let records: Vec<SavedCandidate> = grouped.into_values().flatten().collect();
        self.store.replace_all_saved(records.clone());
        Ok(group_by_title(&records))
    }

    /// Finish a mutation with an authoritative reload. On a failed write the
    /// reload still runs, so the cache reflects whatever the store kept, and
    /// the write error is returned.
    async fn confirm(
        &self,
        job_id: &JobId,
        written: Result<(), GatewayError>,
    ) -> Result<Vec<SavedCandidate>, RankError> {
        match written {
            Ok(()) => Ok(self.reload(job_id).await?),
            Err(err) => {
                if let Err(reload_error) = self.reload(job_id).await {
                    warn!(%job_id, error = %reload_error, "reload after failed write also failed");
                }
                Err(err.into())
            }
        }
    }

    /// Write back the previous version of every record in `written`.
    async fn restore(&self, previous: &[SavedCandidate], written: &[SavedCandidate]) {
        for record in written {
            let Some(original) = find(previous, &record.candidate_link) else {
                continue;
            };
            if let Err(err) = self.gateway.update_saved(original).await {
                warn!(job_id = %original.job_id, candidate_link = %original.candidate_link, error = %err, "could not restore rank");
            }
        }
    }

    /// A job is locked once it is hired, either by status or by a hired record.
    /// A job the cache does not know is looked up on the service.
    async fn ensure_unlocked(
        &self,
        job_id: &JobId,
        records: &[SavedCandidate],
    ) -> Result<(), RankError> {
        let status = match self.store.status(job_id) {
            Some(status) => Some(status),
            None => match self.gateway.job(job_id).await {
                Ok(job) => {
                    let status = job.status;
                    self.store.remember_jobs(&[job]);
                    Some(status)
                }
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err.into()),
            },
        };

        if status == Some(JobStatus::Hired) || records.iter().any(|record| record.hired) {
            return Err(RankError::Locked {
                job_id: job_id.clone(),
            });
        }
        Ok(())
    }
}

fn find<'a>(records: &'a [SavedCandidate], candidate_link: &str) -> Option<&'a SavedCandidate> {
    records
        .iter()
        .find(|record| record.candidate_link == candidate_link)
}
