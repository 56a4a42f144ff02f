use thiserror::Error;

/// Core error types for fwtables
///
/// Generation itself never fails for well-formed input; these errors surface
/// construction-time validation problems that callers must fix, not transient
/// conditions worth retrying.
#[derive(Debug, Error)]
pub enum Error {
    /// A rule comment contained characters that cannot appear inside a quoted
    /// comment token (`"` or a newline).
    #[error("invalid rule comment {0:?}: must not contain '\"' or newlines")]
    InvalidComment(String),

    /// An interface name violated kernel naming constraints.
    #[error("invalid interface name {0:?}")]
    InvalidInterface(String),

    /// A port value outside the usable range (0 is reserved).
    #[error("invalid port {0}: must be between 1 and 65535")]
    InvalidPort(u32),

    /// JSON serialization/deserialization of captured state failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
