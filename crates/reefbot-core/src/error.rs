//! Engine error taxonomy.
//!
//! Every component surfaces failures through [`EngineError`] so callers can
//! classify without string matching. Two Display strings are contract
//! surface for external tests: timeouts contain `"timed"` and cancellations
//! contain `"cancel"`.

use std::path::PathBuf;

/// The typed error taxonomy shared across the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing required fields, malformed route key, empty caller-supplied
    /// session key. Surfaced to the caller verbatim; never produces an
    /// outbound.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Adapter start rejected by the transport. The registry refuses to
    /// route outbound on that channel.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transient transport failure, missing binary, provider unreachable.
    /// Retried by the registry (outbound) or by fallback (model).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A deadline was exceeded.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// A skill entrypoint or host API path escaped the workspace jail.
    /// Fatal to that invocation; never retried.
    #[error("path outside workspace: {}", .0.display())]
    PathOutsideWorkspace(PathBuf),

    /// An explicit token cancel, surfaced by the local provider.
    #[error("generation cancelled: {0}")]
    Cancelled(String),
}

impl EngineError {
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, EngineError::InvalidConfiguration(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, EngineError::Authentication(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::Unavailable(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout(_))
    }

    pub fn is_path_outside_workspace(&self) -> bool {
        matches!(self, EngineError::PathOutsideWorkspace(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled(_))
    }
}
