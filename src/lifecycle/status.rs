use serde::Serialize;
use std::fmt;

/// Process lifecycle status
///
/// Only ever moves forward: `Running -> Draining -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum LifecycleStatus {
    #[serde(rename = "ok")]
    Running = 0,
    #[serde(rename = "draining")]
    Draining = 1,
    #[serde(rename = "terminated")]
    Terminated = 2,
}

impl LifecycleStatus {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Terminated,
        }
    }

    /// Name reported by the health probe.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "ok",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a shutdown request.
///
/// Always an acknowledgement; a second request while draining is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownAck {
    /// This call started the drain.
    Initiated,
    /// A drain was already underway; the status observed at the time.
    AlreadyInProgress(LifecycleStatus),
}

impl ShutdownAck {
    pub fn already_in_progress(&self) -> bool {
        matches!(self, Self::AlreadyInProgress(_))
    }
}

/// How the drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationOutcome {
    /// The transport stopped within the grace period.
    Graceful,
    /// The transport failed or overran the grace period.
    Forced,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order_and_names() {
        assert!(LifecycleStatus::Running < LifecycleStatus::Draining);
        assert!(LifecycleStatus::Draining < LifecycleStatus::Terminated);
        assert_eq!(LifecycleStatus::Running.to_string(), "ok");
        assert_eq!(
            serde_json::to_value(LifecycleStatus::Draining).unwrap(),
            serde_json::json!("draining")
        );
        assert_eq!(LifecycleStatus::from_u8(2), LifecycleStatus::Terminated);
    }
}
