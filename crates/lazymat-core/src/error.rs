use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

/// Every outcome a materializer can fail with.
///
/// Errors are cloned when a single terminal outcome is replayed to many
/// waiters, so payloads stay cheap (`String`) and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// Surfaced by a wrapped materializer or a user-supplied closure and
    /// forwarded verbatim by every operator above it.
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("unsupported in current state: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    pub fn upstream(msg: impl Into<String>) -> Self {
        Error::Upstream(msg.into())
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Error::Cancelled(reason.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
