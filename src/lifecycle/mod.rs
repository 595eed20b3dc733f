//! Process lifecycle: idle reaper, health reporting and the two-phase shutdown.

pub mod controller;
pub mod reaper;
pub mod status;

pub use controller::{ExitHook, LifecycleController, RequestGuard, Transport};
pub use reaper::{IdleTarget, Reaper};
pub use status::{LifecycleStatus, ShutdownAck, TerminationOutcome};
