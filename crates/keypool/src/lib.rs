//! Bounded, per-key pooling of long-lived connection-like resources.
//!
//! A [`PoolCache`] multiplexes a fixed number of concurrent instances per key,
//! lazily creating new instances on demand up to that cap, reclaiming idle
//! instances after a grace period, and supporting live reconfiguration
//! (swapping the factory and/or the cap) without tearing down handles that are
//! currently in use.
//!
//! Values are handed out as [`Handle`]s which return themselves to the pool
//! when dropped. The cache is oblivious to the pooled value's semantics beyond
//! its ability to be closed, expressed through the [`Closeable`] trait.

#![warn(missing_docs)]

use std::sync::Arc;

use futures::future::BoxFuture;

mod cache;
mod cell;
mod config;
mod entry;
mod error;

pub use cache::PoolCache;
pub use cell::Handle;
pub use config::PoolConfig;
pub use error::PoolError;

/// A resource that can be managed by a [`PoolCache`].
///
/// The pool closes values when they are evicted after sitting idle, when they
/// no longer fit after a reconfiguration, and when the pool itself is shut
/// down. The pool never closes the same instance twice.
pub trait Closeable: Send + 'static {
    /// Releases everything the value owns (sockets, background tasks,
    /// protocol state).
    fn close(self) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Builds a fresh value for a pool entry.
///
/// Invoked lazily whenever an acquisition holds a free creation slot and no
/// idle value is available, and during reconfiguration to rebuild retained
/// values on the new configuration.
pub type Factory<V> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<V>> + Send + Sync>;

#[cfg(any(test, feature = "test"))]
pub(crate) use tokio::time;

#[cfg(not(any(test, feature = "test")))]
pub(crate) use std::time;
