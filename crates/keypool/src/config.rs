use std::time::Duration;

use serde::Deserialize;

/// Tuning knobs for a [`PoolCache`](crate::PoolCache).
///
/// All durations deserialize in humantime format (`"5m"`, `"30 minutes"`).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Minimum wall-clock time between two background sweeps.
    ///
    /// Sweeps are triggered opportunistically from acquisition calls, so a
    /// completely idle pool is never swept.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Idle time after which an unused value is closed by the sweep.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5 * 60),
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: PoolConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.idle_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_humantime_durations() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"sweep_interval": "90s", "idle_timeout": "1h"}"#).unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(90));
        assert_eq!(config.idle_timeout, Duration::from_secs(3600));
    }
}
