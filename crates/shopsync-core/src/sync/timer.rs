//! Background trigger for incremental cycles

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::SyncScheduler;
use crate::error::Error;

/// Cancellable task waking every `timer_tick` and running an incremental
/// cycle once the configured interval has elapsed
pub struct SyncTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SyncTimer {
    /// Spawn the timer on the current runtime
    pub fn start(scheduler: Arc<SyncScheduler>) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(scheduler, cancel.clone()));
        tracing::info!("Background sync started");
        Self { cancel, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop ticking and wait for an in-flight cycle to finish
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(error) = self.handle.await {
            tracing::warn!("Background sync task ended abnormally: {error}");
        }
        tracing::info!("Background sync stopped");
    }
}

async fn run(scheduler: Arc<SyncScheduler>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(scheduler.engine_config().timer_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately
    ticker.tick().await;
    let mut last_run: Option<Instant> = None;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tick(&scheduler, &mut last_run).await;
    }
}

async fn tick(scheduler: &SyncScheduler, last_run: &mut Option<Instant>) {
    let config = match scheduler.active_config().await {
        Ok(Some(config)) if config.sync_enabled => config,
        Ok(_) => return,
        Err(error) => {
            tracing::warn!("Background sync could not read its configuration: {error}");
            return;
        }
    };

    let interval = Duration::from_secs(config.sync_interval);
    let due = last_run.map_or(true, |at| at.elapsed() >= interval);
    if !due {
        return;
    }
    *last_run = Some(Instant::now());

    // Items held back behind a failed one wait for a retry, not a new session
    match scheduler.outbox().count_ready().await {
        Ok(0) => {
            tracing::debug!("Scheduled sync skipped: nothing ready to push");
            return;
        }
        Ok(_) => {}
        Err(error) => {
            tracing::warn!("Background sync could not read the queue: {error}");
            return;
        }
    }

    match scheduler.run_incremental().await {
        Ok(summary) => tracing::debug!("Scheduled sync finished: {summary}"),
        Err(Error::SyncInProgress) => {
            tracing::debug!("Scheduled sync skipped: another cycle is running");
        }
        Err(error) => tracing::warn!("Scheduled sync failed: {error}"),
    }
}
