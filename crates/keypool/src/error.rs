use thiserror::Error;

/// Errors surfaced by [`PoolCache`](crate::PoolCache) acquisitions and
/// updates.
///
/// The pool never retries internally; every failure is reported to the caller
/// and leaves the capacity accounting balanced.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The caller's cancellation token fired before a value was acquired.
    #[error("acquisition cancelled")]
    Cancelled,

    /// The pool has been shut down; no further values are handed out.
    #[error("pool is shut down")]
    ShutDown,

    /// A pool entry cannot be created with a capacity of zero.
    #[error("pool capacity must be at least 1")]
    InvalidCapacity,

    /// The value factory failed. The creation slot consumed for the attempt
    /// has been returned to the entry.
    #[error("failed to create pooled value: {0:#}")]
    Factory(anyhow::Error),

    /// A reconfiguration could not rebuild some of the retained values on the
    /// new factory. The entry stays usable with whatever was rebuilt; each
    /// failed value's creation slot has been returned.
    #[error("failed to rebuild {} pooled value(s) during reconfiguration", .0.len())]
    Rebuild(Vec<anyhow::Error>),
}
