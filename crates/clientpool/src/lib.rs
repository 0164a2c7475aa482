//! Pooled broker clients keyed by a bootstrap/credentials fingerprint.
//!
//! A [`ClientPool`] sits on top of [`keypool::PoolCache`] and takes care of
//! the two things the generic pool leaves to its callers: deriving a stable
//! [`ClientKey`] from the broker bootstrap addresses plus the credentials in
//! use, and turning an injected async connect function into the factory
//! closures the pool expects.
//!
//! Credential rotation is handled through [`ClientPool::reconfigure`]: the
//! key identifies *which* credentials are used, not their contents, so a
//! rotation keeps the key and hot-swaps the factory underneath clients that
//! are currently handed out.

#![warn(missing_docs)]

mod config;
mod error;
mod key;
mod pool;

pub use config::ClientPoolConfig;
pub use error::ClientPoolError;
pub use key::{ClientKey, CredentialsRef};
pub use pool::{ClientPool, ClientSettings, ConnectFn};

pub use keypool::{Closeable, Handle};
