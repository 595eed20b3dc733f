use crate::config::DaemonConfig;
use crate::core::Result;
use crate::lifecycle::{LifecycleController, TerminationOutcome};
use crate::registry::Registry;
use crate::server::{AppState, Dataset, HttpTransport, build_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// A running daemon: registry, lifecycle controller and HTTP transport wired
/// together.
pub struct Daemon {
    config: DaemonConfig,
    registry: Arc<Registry<Dataset>>,
    lifecycle: Arc<LifecycleController>,
    transport: Arc<HttpTransport>,
}

impl Daemon {
    /// Bind the transport and start the idle countdown.
    pub async fn start(config: DaemonConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(Registry::with_policies(
            config.duplicate_identifier_policy,
            config.alias_conflict_policy,
        ));
        let lifecycle = LifecycleController::new(&config)?;

        let router = build_router(AppState::new(
            Arc::clone(&registry),
            Arc::clone(&lifecycle),
        ));
        let transport = HttpTransport::bind(&config.address(), router).await?;
        lifecycle.attach_transport(transport.clone())?;
        lifecycle.start();

        info!(
            address = %transport.local_addr(),
            duplicate_identifier_policy = %config.duplicate_identifier_policy,
            alias_conflict_policy = %config.alias_conflict_policy,
            "daemon started"
        );

        Ok(Self {
            config,
            registry,
            lifecycle,
            transport,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry<Dataset>> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    /// Resolves once the daemon has terminated, by idle timeout or by request.
    pub async fn wait(&self) -> TerminationOutcome {
        self.lifecycle.wait_terminated().await
    }
}
