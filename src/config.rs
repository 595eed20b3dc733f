use crate::core::{DaemonError, Result};
use crate::registry::ConflictPolicy;
use std::env;
use std::time::Duration;
use tokio::time::Instant;

pub const ENV_HOST: &str = "MEMODAEMON_HOST";
pub const ENV_PORT: &str = "MEMODAEMON_PORT";
pub const ENV_IDLE_TIMEOUT: &str = "MEMODAEMON_IDLE_TIMEOUT";
pub const ENV_DRAIN_GRACE: &str = "MEMODAEMON_DRAIN_GRACE";
pub const ENV_DUPLICATE_IDENTIFIER_POLICY: &str = "MEMODAEMON_DUPLICATE_IDENTIFIER_POLICY";
pub const ENV_ALIAS_CONFLICT_POLICY: &str = "MEMODAEMON_ALIAS_CONFLICT_POLICY";
pub const ENV_REAPER: &str = "MEMODAEMON_REAPER";

/// Default idle window before the daemon shuts itself down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default upper bound on the transport drain during shutdown.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Daemon startup configuration
///
/// Built with the setters below, or read from the environment with
/// [`DaemonConfig::from_env`]. CLI flags are layered on top by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Address the HTTP transport binds to
    pub host: String,

    /// Port the HTTP transport binds to (0 picks an ephemeral port)
    pub port: u16,

    /// Inactivity window after which the reaper shuts the daemon down
    pub idle_timeout: Duration,

    /// How long the drain may wait for the transport before forcing exit
    pub drain_grace: Duration,

    /// What `register` does when the identifier is already taken
    pub duplicate_identifier_policy: ConflictPolicy,

    /// What `bind_alias` does when the alias points elsewhere
    pub alias_conflict_policy: ConflictPolicy,

    /// When false the daemon never times out on its own
    pub reaper_enabled: bool,
}

impl DaemonConfig {
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 40000,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            drain_grace: DEFAULT_DRAIN_GRACE,
            duplicate_identifier_policy: ConflictPolicy::Reject,
            alias_conflict_policy: ConflictPolicy::Reject,
            reaper_enabled: true,
        }
    }

    /// Set the bind host
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the bind port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the drain grace period
    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Set the duplicate identifier policy
    pub fn duplicate_identifier_policy(mut self, policy: ConflictPolicy) -> Self {
        self.duplicate_identifier_policy = policy;
        self
    }

    /// Set the alias conflict policy
    pub fn alias_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.alias_conflict_policy = policy;
        self
    }

    /// Enable or disable the idle reaper
    pub fn reaper_enabled(mut self, enabled: bool) -> Self {
        self.reaper_enabled = enabled;
        self
    }

    /// Load configuration from `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(host) = lookup(ENV_HOST) {
            config.host = host;
        }

        if let Some(port) = lookup(ENV_PORT) {
            config.port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| DaemonError::Config(format!("{ENV_PORT} must be a valid u16")))?;
        }

        if let Some(raw) = lookup(ENV_IDLE_TIMEOUT) {
            config.idle_timeout = parse_duration(&raw)
                .map_err(|e| DaemonError::Config(format!("{ENV_IDLE_TIMEOUT}: {e}")))?;
        }

        if let Some(raw) = lookup(ENV_DRAIN_GRACE) {
            config.drain_grace = parse_duration(&raw)
                .map_err(|e| DaemonError::Config(format!("{ENV_DRAIN_GRACE}: {e}")))?;
        }

        if let Some(raw) = lookup(ENV_DUPLICATE_IDENTIFIER_POLICY) {
            config.duplicate_identifier_policy = raw.parse().map_err(|e| {
                DaemonError::Config(format!("{ENV_DUPLICATE_IDENTIFIER_POLICY}: {e}"))
            })?;
        }

        if let Some(raw) = lookup(ENV_ALIAS_CONFLICT_POLICY) {
            config.alias_conflict_policy = raw
                .parse()
                .map_err(|e| DaemonError::Config(format!("{ENV_ALIAS_CONFLICT_POLICY}: {e}")))?;
        }

        if let Some(raw) = lookup(ENV_REAPER) {
            config.reaper_enabled = parse_switch(&raw)
                .map_err(|e| DaemonError::Config(format!("{ENV_REAPER}: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(DaemonError::Config("host cannot be empty".to_string()));
        }

        if self.idle_timeout.is_zero() {
            return Err(DaemonError::Config("idle_timeout must be > 0".to_string()));
        }

        // The reaper schedules `now + idle_timeout`; a deadline the clock
        // cannot represent would leave it permanently disarmed.
        if Instant::now().checked_add(self.idle_timeout).is_none() {
            return Err(DaemonError::Config(format!(
                "idle_timeout {:?} is too large",
                self.idle_timeout
            )));
        }

        if self.drain_grace.is_zero() {
            return Err(DaemonError::Config("drain_grace must be > 0".to_string()));
        }

        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a duration string (e.g. "250ms", "30s", "5m", "1h", "1d")
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim().to_lowercase();

    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = s.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = s.strip_suffix('m') {
        (num, "m")
    } else if let Some(num) = s.strip_suffix('h') {
        (num, "h")
    } else if let Some(num) = s.strip_suffix('d') {
        (num, "d")
    } else {
        (s.as_str(), "s")
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {num_str}"))?;

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Err(format!("unknown unit: {unit}")),
    };

    num.checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: {s}"))
}

fn parse_switch(raw: &str) -> std::result::Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(format!("expected on/off, got '{other}'")),
    }
}
