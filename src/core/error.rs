use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DaemonError {
    #[error("Dataset '{0}' not found")]
    NotFound(String),

    #[error("Identifier '{0}' is not registered")]
    UnknownIdentifier(String),

    #[error("Alias '{0}' is not bound")]
    UnknownAlias(String),

    #[error("Reference '{0}' matches no identifier or alias")]
    UnresolvedReference(String),

    #[error("Identifier '{0}' already exists")]
    DuplicateIdentifier(String),

    #[error("Alias '{alias}' is already bound to '{bound_to}'")]
    AliasConflict { alias: String, bound_to: String },

    #[error("No free numeric identifier left")]
    IdentifiersExhausted,

    #[error("Shutdown already in progress")]
    ShutdownInProgress,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl DaemonError {
    /// True for lookup and routing failures that clients see as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::UnknownIdentifier(_)
                | Self::UnknownAlias(_)
                | Self::UnresolvedReference(_)
        )
    }

    /// True for registration-time policy violations.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::DuplicateIdentifier(_) | Self::AliasConflict { .. } | Self::IdentifiersExhausted
        )
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;

impl<T> From<std::sync::PoisonError<T>> for DaemonError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
