use anyhow::{Context, Result};
use clap::Parser;
use memodaemon::{ConflictPolicy, Daemon, DaemonConfig, TerminationOutcome, config::parse_duration};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memodaemon")]
#[command(about = "Ephemeral in-memory dataset server that exits when left idle")]
struct Cli {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// e.g. 250ms, 30s, 5m, 1h
    #[arg(long, value_parser = parse_duration)]
    idle_timeout: Option<Duration>,
    #[arg(long, value_parser = parse_duration)]
    drain_grace: Option<Duration>,
    #[arg(long)]
    duplicate_identifier_policy: Option<ConflictPolicy>,
    #[arg(long)]
    alias_conflict_policy: Option<ConflictPolicy>,
    /// Never shut down on inactivity
    #[arg(long)]
    no_reaper: bool,
}

impl Cli {
    fn apply(self, mut config: DaemonConfig) -> DaemonConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(timeout) = self.idle_timeout {
            config.idle_timeout = timeout;
        }
        if let Some(grace) = self.drain_grace {
            config.drain_grace = grace;
        }
        if let Some(policy) = self.duplicate_identifier_policy {
            config.duplicate_identifier_policy = policy;
        }
        if let Some(policy) = self.alias_conflict_policy {
            config.alias_conflict_policy = policy;
        }
        if self.no_reaper {
            config.reaper_enabled = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.apply(DaemonConfig::from_env().context("failed to load daemon configuration")?);

    let daemon = Daemon::start(config)
        .await
        .context("failed to start daemon")?;

    daemon
        .lifecycle()
        .set_exit_hook(Box::new(|outcome| {
            if outcome == TerminationOutcome::Forced {
                error!("transport did not drain, exiting immediately");
                std::process::exit(1);
            }
        }))
        .context("failed to install exit hook")?;

    let lifecycle = daemon.lifecycle().clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        lifecycle.initiate_shutdown();
    });

    let outcome = daemon.wait().await;
    info!(?outcome, "memodaemon exiting");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("memodaemon=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
