use super::reaper::{IdleTarget, Reaper};
use super::status::{LifecycleStatus, ShutdownAck, TerminationOutcome};
use crate::config::DaemonConfig;
use crate::core::{DaemonError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

/// The request-accepting side of the daemon, as seen by the controller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stop accepting new requests and wait for in-flight ones to finish.
    async fn stop(&self) -> Result<()>;

    /// Whether the transport is still accepting requests.
    fn is_serving(&self) -> bool;

    /// Close the listener without waiting. Called when the drain ran out of time.
    fn abort(&self) {}
}

/// Runs once, after the status reached `Terminated`.
pub type ExitHook = Box<dyn FnOnce(TerminationOutcome) + Send>;

/// Held for the duration of one admitted data request.
pub struct RequestGuard {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.in_flight
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Owns the reaper and sequences health reporting and shutdown.
pub struct LifecycleController {
    status: AtomicU8,
    status_tx: watch::Sender<LifecycleStatus>,
    reaper: Reaper,
    idle_timeout: Duration,
    drain_grace: Duration,
    reaper_enabled: bool,
    in_flight: Arc<watch::Sender<usize>>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    exit_hook: Mutex<Option<ExitHook>>,
    outcome: OnceLock<TerminationOutcome>,
    runtime: Handle,
    this: Weak<LifecycleController>,
}

impl LifecycleController {
    /// Build a controller on the current tokio runtime.
    ///
    /// The reaper stays disarmed until [`LifecycleController::start`].
    pub fn new(config: &DaemonConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| DaemonError::Config(format!("no tokio runtime: {e}")))?;
        let (status_tx, _) = watch::channel(LifecycleStatus::Running);
        let (in_flight, _) = watch::channel(0usize);

        Ok(Arc::new_cyclic(|this: &Weak<Self>| {
            let target: Weak<dyn IdleTarget> = this.clone();
            Self {
                status: AtomicU8::new(LifecycleStatus::Running as u8),
                status_tx,
                reaper: Reaper::new(target, runtime.clone()),
                idle_timeout: config.idle_timeout,
                drain_grace: config.drain_grace,
                reaper_enabled: config.reaper_enabled,
                in_flight: Arc::new(in_flight),
                transport: Mutex::new(None),
                exit_hook: Mutex::new(None),
                outcome: OnceLock::new(),
                runtime,
                this: this.clone(),
            }
        }))
    }

    pub fn attach_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        *self.transport.lock()? = Some(transport);
        Ok(())
    }

    pub fn set_exit_hook(&self, hook: ExitHook) -> Result<()> {
        *self.exit_hook.lock()? = Some(hook);
        Ok(())
    }

    /// Begin the idle countdown. Startup counts as activity.
    pub fn start(&self) {
        info!(
            idle_timeout_ms = self.idle_timeout.as_millis() as u64,
            reaper = self.reaper_enabled,
            "lifecycle started"
        );
        self.report_activity();
    }

    /// Record an inbound request. Cheap, never blocks on I/O.
    pub fn report_activity(&self) {
        if !self.reaper_enabled || !self.health().is_running() {
            return;
        }

        if let Err(err) = self.reaper.arm(self.idle_timeout) {
            warn!(error = %err, "failed to re-arm idle reaper");
            return;
        }

        // Lost a race with shutdown: do not leave a trigger behind.
        if !self.health().is_running() {
            let _ = self.reaper.disarm();
        }
    }

    /// Admit a data request: count it as in flight and report activity.
    ///
    /// Fails with `ShutdownInProgress` once the drain has begun. The count is
    /// raised before the status is checked, so the drain either sees this
    /// request or this request sees the drain.
    pub fn admit_request(&self) -> Result<RequestGuard> {
        self.in_flight.send_modify(|count| *count += 1);
        let guard = RequestGuard {
            in_flight: Arc::clone(&self.in_flight),
        };

        self.ensure_running()?;
        self.report_activity();
        Ok(guard)
    }

    pub fn in_flight_requests(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub fn health(&self) -> LifecycleStatus {
        LifecycleStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// `Err(ShutdownInProgress)` once the drain has begun.
    pub fn ensure_running(&self) -> Result<()> {
        if self.health().is_running() {
            Ok(())
        } else {
            Err(DaemonError::ShutdownInProgress)
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn idle_deadline(&self) -> Option<Instant> {
        self.reaper.deadline()
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Start the drain. Returns before the drain completes.
    ///
    /// Only the first caller runs the drain; everyone else gets
    /// `AlreadyInProgress` with the status they observed.
    pub fn initiate_shutdown(&self) -> ShutdownAck {
        if let Err(err) = self.reaper.disarm() {
            warn!(error = %err, "failed to disarm idle reaper");
        }

        if !self.advance(LifecycleStatus::Running, LifecycleStatus::Draining) {
            let status = self.health();
            debug!(%status, "shutdown already in progress");
            return ShutdownAck::AlreadyInProgress(status);
        }

        info!(
            drain_grace_ms = self.drain_grace.as_millis() as u64,
            "shutdown initiated, draining"
        );

        match self.this.upgrade() {
            Some(this) => {
                self.runtime.spawn(this.drain());
            }
            None => {
                // Controller is being dropped; nothing left to drain.
                self.finish(TerminationOutcome::Forced);
            }
        }

        ShutdownAck::Initiated
    }

    /// Resolves once the status is `Terminated`.
    pub async fn wait_terminated(&self) -> TerminationOutcome {
        let mut rx = self.status_tx.subscribe();
        while *rx.borrow_and_update() != LifecycleStatus::Terminated {
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.outcome
            .get()
            .copied()
            .unwrap_or(TerminationOutcome::Forced)
    }

    pub async fn shutdown_and_wait(&self) -> TerminationOutcome {
        self.initiate_shutdown();
        self.wait_terminated().await
    }

    /// Wait for admitted requests, then stop the transport, all within
    /// `drain_grace`. The listener stays open meanwhile so health keeps
    /// answering `draining`.
    async fn drain(self: Arc<Self>) {
        let transport = self
            .transport
            .lock()
            .ok()
            .and_then(|transport| transport.clone());

        let graceful = async {
            self.requests_finished().await;
            debug!("in-flight requests finished");
            match &transport {
                Some(transport) => transport.stop().await,
                None => Ok(()),
            }
        };

        let outcome = match timeout(self.drain_grace, graceful).await {
            Ok(Ok(())) => TerminationOutcome::Graceful,
            Ok(Err(err)) => {
                error!(error = %err, "transport failed to stop, forcing termination");
                TerminationOutcome::Forced
            }
            Err(_) => {
                error!(
                    drain_grace_ms = self.drain_grace.as_millis() as u64,
                    in_flight = self.in_flight_requests(),
                    "drain did not finish within grace period, forcing termination"
                );
                TerminationOutcome::Forced
            }
        };

        if outcome == TerminationOutcome::Forced {
            if let Some(transport) = &transport {
                transport.abort();
            }
        }

        self.finish(outcome);
    }

    async fn requests_finished(&self) {
        let mut rx = self.in_flight.subscribe();
        while *rx.borrow_and_update() > 0 {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    fn finish(&self, outcome: TerminationOutcome) {
        let _ = self.outcome.set(outcome);
        self.advance(LifecycleStatus::Draining, LifecycleStatus::Terminated);
        info!(?outcome, "terminated");

        let hook = self.exit_hook.lock().ok().and_then(|mut hook| hook.take());
        if let Some(hook) = hook {
            hook(outcome);
        }
    }

    fn advance(&self, from: LifecycleStatus, to: LifecycleStatus) -> bool {
        let advanced = self
            .status
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if advanced {
            self.status_tx.send_replace(to);
        }
        advanced
    }
}

#[async_trait]
impl IdleTarget for LifecycleController {
    async fn is_serving(&self) -> Result<bool> {
        if !self.health().is_running() {
            return Ok(false);
        }
        let transport = self.transport.lock()?;
        Ok(transport
            .as_ref()
            .map(|transport| transport.is_serving())
            .unwrap_or(true))
    }

    async fn on_idle(&self) {
        self.initiate_shutdown();
    }
}
