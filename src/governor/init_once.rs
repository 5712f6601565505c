//! Once-only asynchronous initialization with a double-checked fast path.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

const NOT_STARTED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const FAILED: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    NotStarted,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("initialization of `{unit}` failed: {reason}")]
    Failed { unit: String, reason: String },

    #[error("`{unit}` failed to initialize earlier: {reason}")]
    PreviouslyFailed { unit: String, reason: String },
}

/// Runs an initializer exactly once per unit instance. Concurrent callers
/// wait for the single run; once it succeeded, callers pay one atomic load.
/// A failed run is not retried: every later caller gets the recorded error.
#[derive(Debug)]
pub struct InitOnce {
    unit: String,
    state: AtomicU8,
    failure: Mutex<Option<String>>,
}

impl InitOnce {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            state: AtomicU8::new(NOT_STARTED),
            failure: Mutex::new(None),
        }
    }

    /// An already-initialized cell, used for restored instances.
    pub fn completed(unit: impl Into<String>) -> Self {
        let cell = Self::new(unit);
        cell.state.store(DONE, Ordering::Release);
        cell
    }

    pub fn state(&self) -> InitState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => InitState::Running,
            DONE => InitState::Done,
            FAILED => InitState::Failed,
            _ => InitState::NotStarted,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    pub async fn call_once<F, Fut>(&self, f: F) -> Result<(), InitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if self.is_done() {
            return Ok(());
        }

        let mut failure = self.failure.lock().await;
        match self.state.load(Ordering::Acquire) {
            DONE => return Ok(()),
            FAILED => {
                return Err(InitError::PreviouslyFailed {
                    unit: self.unit.clone(),
                    reason: failure.clone().unwrap_or_default(),
                })
            }
            _ => {}
        }

        self.state.store(RUNNING, Ordering::Release);
        let started = Instant::now();
        info!(component = "init", event = "started", unit = self.unit.as_str(), "initializing unit");

        match f().await {
            Ok(()) => {
                self.state.store(DONE, Ordering::Release);
                info!(
                    component = "init",
                    event = "done",
                    unit = self.unit.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "unit initialized"
                );
                Ok(())
            }
            Err(e) => {
                let reason = format!("{e:#}");
                error!(
                    component = "init",
                    event = "failed",
                    unit = self.unit.as_str(),
                    error = reason.as_str(),
                    "unit initialization failed"
                );
                *failure = Some(reason.clone());
                self.state.store(FAILED, Ordering::Release);
                Err(InitError::Failed {
                    unit: self.unit.clone(),
                    reason,
                })
            }
        }
    }
}
