use keypool::PoolConfig;
use serde::Deserialize;

/// Configuration for a [`ClientPool`](crate::ClientPool).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientPoolConfig {
    /// Maximum number of concurrently live clients per broker/credentials
    /// pair.
    pub capacity_per_key: usize,

    /// Tuning for the underlying per-key pool.
    pub pool: PoolConfig,
}

impl Default for ClientPoolConfig {
    fn default() -> Self {
        Self {
            capacity_per_key: 6,
            pool: PoolConfig::default(),
        }
    }
}
