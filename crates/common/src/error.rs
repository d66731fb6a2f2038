use thiserror::Error;

/// Canonical DFQ error taxonomy used across crates.
///
/// Classification guidance:
/// - [`DfqError::InvalidAlgebra`]: unrecognized operator token or malformed
///   plan JSON, raised while building the graph (the graph is never started)
/// - [`DfqError::Kernel`]: a kernel body failed while the graph was running
/// - [`DfqError::ResourceExhaustion`]: a memory pool refused a reservation
/// - [`DfqError::Transport`]: a remote peer was unreachable or rejected a payload
/// - [`DfqError::InvalidConfig`]: option/context contract violations
/// - [`DfqError::Io`]: raw filesystem/network IO failures from std APIs
#[derive(Debug, Error)]
pub enum DfqError {
    /// Unsupported or malformed relational algebra.
    ///
    /// Examples:
    /// - operator token not in the kernel catalog
    /// - plan JSON missing `expr`/`children`
    #[error("invalid relational algebra: {0}")]
    InvalidAlgebra(String),

    /// Runtime kernel failures after the graph started.
    ///
    /// Examples:
    /// - expression evaluation failure inside a compute backend
    /// - a data loader failing mid-scan
    /// - a cache channel used after teardown
    #[error("kernel execution error: {0}")]
    Kernel(String),

    /// A memory pool could not satisfy a reservation.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// Cross-node transport failures while publishing batches.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid or inconsistent configuration/options state.
    ///
    /// Examples:
    /// - non-decimal value for a numeric option key
    /// - referencing a port that the kernel never declared
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard DFQ result alias.
pub type Result<T> = std::result::Result<T, DfqError>;
