//! Per-record push lanes with bounded concurrency.
//!
//! Items for the same `(table, record_id)` share a lane and are pushed
//! strictly in order. Distinct lanes run concurrently on a `JoinSet`, gated
//! by a semaphore. After a failure the rest of that lane stays `pending`
//! without being sent, held back until the failed item is retried, so a later
//! mutation never overtakes an earlier one. An unreachable or rejecting
//! backend stops the lane and returns its items to `pending` as well.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{QueueItem, QueueOperation, QueueStatus, RecordPayload, Table};
use crate::outbox::Outbox;
use crate::remote::RemoteAdapter;

/// One mutation to send
#[derive(Debug, Clone)]
pub struct PushJob {
    /// Outbox item backing this job; snapshot pushes have none
    pub queue_id: Option<i64>,
    pub table: Table,
    pub operation: QueueOperation,
    pub record_id: i64,
    pub payload: String,
}

impl PushJob {
    pub fn from_item(item: QueueItem) -> Self {
        Self {
            queue_id: Some(item.id),
            table: item.table_name,
            operation: item.operation,
            record_id: item.record_id,
            payload: item.payload,
        }
    }

    /// Insert of a local record outside the outbox
    pub fn snapshot(record: &RecordPayload) -> Result<Self> {
        Ok(Self {
            queue_id: None,
            table: record.table(),
            operation: QueueOperation::Insert,
            record_id: record.record_id(),
            payload: record.encode()?,
        })
    }

    const fn key(&self) -> (Table, i64) {
        (self.table, self.record_id)
    }

    fn label(&self) -> String {
        match self.queue_id {
            Some(id) => format!("#{id}"),
            None => format!("{} #{}", self.table, self.record_id),
        }
    }
}

/// Totals of a push run
#[derive(Debug, Default)]
pub struct PushTally {
    pub synced: i64,
    pub failed: i64,
    /// Items left pending behind a failed item of the same record
    pub held: i64,
    /// Connectivity or auth error that stopped a lane; its items went back to pending
    pub fatal: Option<Error>,
}

impl PushTally {
    pub fn absorb(&mut self, other: Self) {
        self.synced += other.synced;
        self.failed += other.failed;
        self.held += other.held;
        if self.fatal.is_none() {
            self.fatal = other.fatal;
        }
    }
}

/// Push `jobs` grouped into per-record lanes.
///
/// With an outbox, each job's queue item is marked `synced` or `failed` as
/// soon as its push settles.
pub async fn push_lanes(
    adapter: Arc<dyn RemoteAdapter>,
    jobs: Vec<PushJob>,
    outbox: Option<Outbox>,
    config: &EngineConfig,
) -> Result<PushTally> {
    let semaphore = Arc::new(Semaphore::new(config.push_concurrency));
    let mut tasks = JoinSet::new();

    for lane in group_lanes(jobs) {
        let adapter = Arc::clone(&adapter);
        let semaphore = Arc::clone(&semaphore);
        let outbox = outbox.clone();
        let timeout = config.item_timeout;
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|error| Error::Push(format!("push lanes closed: {error}")))?;
            run_lane(adapter.as_ref(), lane, outbox.as_ref(), timeout).await
        });
    }

    let mut tally = PushTally::default();
    while let Some(joined) = tasks.join_next().await {
        let lane = joined.map_err(|error| Error::Push(format!("push task failed: {error}")))??;
        tally.absorb(lane);
    }
    Ok(tally)
}

/// Split jobs into lanes, keeping first-seen order across lanes and job order within
fn group_lanes(jobs: Vec<PushJob>) -> Vec<Vec<PushJob>> {
    let mut lanes: Vec<Vec<PushJob>> = Vec::new();
    let mut index: HashMap<(Table, i64), usize> = HashMap::new();
    for job in jobs {
        let slot = *index.entry(job.key()).or_insert_with(|| {
            lanes.push(Vec::new());
            lanes.len() - 1
        });
        lanes[slot].push(job);
    }
    lanes
}

async fn run_lane(
    adapter: &dyn RemoteAdapter,
    lane: Vec<PushJob>,
    outbox: Option<&Outbox>,
    timeout: Duration,
) -> Result<PushTally> {
    let mut tally = PushTally::default();
    let mut jobs = lane.into_iter();

    while let Some(job) = jobs.next() {
        match push_one(adapter, &job, timeout).await {
            Ok(()) => {
                settle(outbox, &job, QueueStatus::Synced, None).await?;
                tally.synced += 1;
            }
            Err(error) if error.is_cycle_fatal() => {
                // Not the item's fault: hand the rest of the lane back untouched
                tracing::warn!("Push of {} aborted: {error}", job.label());
                settle(outbox, &job, QueueStatus::Pending, None).await?;
                for rest in jobs.by_ref() {
                    settle(outbox, &rest, QueueStatus::Pending, None).await?;
                }
                tally.fatal = Some(error);
            }
            Err(error) => {
                let message = error.to_string();
                tracing::warn!(
                    "Push of {} {} {} failed: {message}",
                    job.operation,
                    job.table,
                    job.label()
                );
                settle(outbox, &job, QueueStatus::Failed, Some(&message)).await?;
                tally.failed += 1;
                for rest in jobs.by_ref() {
                    settle(outbox, &rest, QueueStatus::Pending, None).await?;
                    tally.held += 1;
                }
                if tally.held > 0 {
                    tracing::debug!("Held back {} items behind {}", tally.held, job.label());
                }
            }
        }
    }
    Ok(tally)
}

async fn push_one(adapter: &dyn RemoteAdapter, job: &PushJob, timeout: Duration) -> Result<()> {
    tokio::time::timeout(
        timeout,
        adapter.push(job.table, job.operation, job.record_id, &job.payload),
    )
    .await
    .map_err(|_| Error::Push(format!("timed out after {}s", timeout.as_secs_f64())))?
}

async fn settle(
    outbox: Option<&Outbox>,
    job: &PushJob,
    status: QueueStatus,
    error: Option<&str>,
) -> Result<()> {
    match (outbox, job.queue_id) {
        (Some(outbox), Some(id)) => outbox.mark_status(id, status, error).await,
        _ => Ok(()),
    }
}
