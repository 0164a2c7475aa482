use keypool::PoolError;
use thiserror::Error;

/// Errors surfaced by [`ClientPool`](crate::ClientPool) operations.
#[derive(Debug, Error)]
pub enum ClientPoolError {
    /// No bootstrap addresses were supplied, so no key can be derived and no
    /// connection attempted.
    #[error("no bootstrap servers configured")]
    NoBootstrapServers,

    /// The underlying pool rejected or aborted the operation.
    #[error(transparent)]
    Pool(#[from] PoolError),
}
