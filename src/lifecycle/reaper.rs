//! Idle reaper: a single resettable deferred shutdown trigger.
//!
//! Every `arm` replaces the pending trigger under one mutex, so however many
//! callers race, exactly one sleeper is live and its deadline is the last
//! one written. Each sleeper carries the generation it was armed with and
//! only fires if that generation is still current when it wakes.

use crate::core::{DaemonError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

/// Owner the reaper reports to when the idle window elapses.
#[async_trait]
pub trait IdleTarget: Send + Sync + 'static {
    /// Liveness probe consulted right before firing.
    async fn is_serving(&self) -> Result<bool>;

    /// Called once the idle window elapsed and the probe reported live.
    async fn on_idle(&self);
}

struct ReaperState {
    deadline: Option<Instant>,
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct ReaperShared {
    state: Mutex<ReaperState>,
    target: Weak<dyn IdleTarget>,
    fired: AtomicU64,
}

impl ReaperShared {
    async fn on_fire(&self, generation: u64) {
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.generation != generation || state.deadline.is_none() {
                return;
            }
            // From here on the firing is claimed; later arms schedule afresh.
            state.deadline = None;
            state.pending = None;
        }

        let Some(target) = self.target.upgrade() else {
            return;
        };

        match target.is_serving().await {
            Ok(true) => {
                self.fired.fetch_add(1, Ordering::SeqCst);
                info!("idle timeout elapsed, triggering shutdown");
                target.on_idle().await;
            }
            Ok(false) => debug!("idle timeout elapsed but process is no longer serving"),
            Err(err) => debug!(error = %err, "liveness probe failed, reaper stands down"),
        }
    }
}

/// Process-wide idle timer
pub struct Reaper {
    shared: Arc<ReaperShared>,
    runtime: Handle,
}

impl Reaper {
    pub fn new(target: Weak<dyn IdleTarget>, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(ReaperShared {
                state: Mutex::new(ReaperState {
                    deadline: None,
                    generation: 0,
                    pending: None,
                }),
                target,
                fired: AtomicU64::new(0),
            }),
            runtime,
        }
    }

    /// Schedule the trigger at `now + timeout`, replacing any pending one.
    pub fn arm(&self, timeout: Duration) -> Result<Instant> {
        let mut state = self.shared.state.lock()?;

        let deadline = Instant::now()
            .checked_add(timeout)
            .ok_or_else(|| DaemonError::Config("idle timeout overflows the clock".to_string()))?;

        if let Some(pending) = state.pending.take() {
            pending.abort();
        }

        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        state.deadline = Some(deadline);

        let shared = Arc::clone(&self.shared);
        state.pending = Some(self.runtime.spawn(async move {
            sleep_until(deadline).await;
            shared.on_fire(generation).await;
        }));

        Ok(deadline)
    }

    /// Cancel the pending trigger, if any.
    ///
    /// A sleeper that already claimed its firing is not affected.
    pub fn disarm(&self) -> Result<()> {
        let mut state = self.shared.state.lock()?;

        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.deadline = None;
        state.generation = state.generation.wrapping_add(1);
        Ok(())
    }

    pub fn is_armed(&self) -> bool {
        self.deadline().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.shared
            .state
            .lock()
            .ok()
            .and_then(|state| state.deadline)
    }

    /// How many times the trigger actually fired.
    pub fn fire_count(&self) -> u64 {
        self.shared.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            if let Some(pending) = state.pending.take() {
                pending.abort();
            }
        }
    }
}
