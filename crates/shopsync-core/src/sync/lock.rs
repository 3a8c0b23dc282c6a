//! Single-flight cycle lock

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::CycleKind;

/// What the engine is doing right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "kind", rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    Running(CycleKind),
}

/// Serializes push, pull, full and migration cycles.
///
/// A second cycle is rejected, never queued.
#[derive(Debug, Clone, Default)]
pub struct CycleLock {
    state: Arc<Mutex<CycleState>>,
}

impl CycleLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move from `Idle` to `Running(kind)`, or fail with [`Error::SyncInProgress`]
    pub fn try_begin(&self, kind: CycleKind) -> Result<CycleGuard> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let CycleState::Running(current) = *state {
            tracing::debug!("Rejected {kind} cycle while {current} cycle is running");
            return Err(Error::SyncInProgress);
        }
        *state = CycleState::Running(kind);
        Ok(CycleGuard {
            state: Arc::clone(&self.state),
            kind,
        })
    }
}

/// Holds the cycle lock; dropping it returns the engine to `Idle`
#[derive(Debug)]
pub struct CycleGuard {
    state: Arc<Mutex<CycleState>>,
    kind: CycleKind,
}

impl CycleGuard {
    pub const fn kind(&self) -> CycleKind {
        self.kind
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = CycleState::Idle;
    }
}
