// ============================================================================
// memodaemon Library
// ============================================================================

pub mod config;
pub mod core;
pub mod daemon;
pub mod lifecycle;
pub mod registry;
pub mod server;

pub use config::DaemonConfig;
pub use core::{DaemonError, Result};
pub use daemon::Daemon;
pub use lifecycle::{
    LifecycleController, LifecycleStatus, Reaper, ShutdownAck, TerminationOutcome, Transport,
};
pub use registry::{
    ConflictPolicy, DatasetEntry, ReferencedEntry, Registry, Resolution, ResolvedVia,
};
pub use server::{AppState, Dataset, build_router};
