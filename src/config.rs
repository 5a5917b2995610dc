//! Scheduler configuration.
//!
//! Loading is left to the embedding application: these types derive serde
//! traits and fill unspecified fields from [`crate::constants`].

use crate::constants::{
    DEFAULT_IDLE_WAIT_MS, DEFAULT_MAX_HIGH_OPS, DEFAULT_OP_SIZE, DEFAULT_TICK_INTERVAL_MS,
    MAX_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one [`RateControlScheduler`](crate::scheduler::RateControlScheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Byte rate limit per second. 0 = unlimited.
    pub rate_limit: u64,
    /// Length of one scheduling interval.
    pub tick_interval_ms: u64,
    /// How long to sleep when no entity has work.
    pub idle_wait_ms: u64,
    /// Upper bound on bytes moved by a single processing op.
    pub op_size: usize,
    /// Back-to-back ops a high priority entity may take per round.
    pub max_high_ops: usize,
    /// Boost connections to high priority until their handshake completes.
    pub boost_handshakes: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate_limit: 0,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            idle_wait_ms: DEFAULT_IDLE_WAIT_MS,
            op_size: DEFAULT_OP_SIZE,
            max_high_ops: DEFAULT_MAX_HIGH_OPS,
            boost_handshakes: true,
        }
    }
}

impl SchedulerConfig {
    /// Rates below one byte per tick are averaged across ticks.
    pub fn with_rate_limit(mut self, bytes_per_sec: u64) -> Self {
        self.rate_limit = bytes_per_sec;
        self
    }

    /// Clamped to `1..=MAX_INTERVAL_MS`.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.clamp(1, MAX_INTERVAL_MS))
    }

    /// Clamped to `1..=MAX_INTERVAL_MS`.
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms.clamp(1, MAX_INTERVAL_MS))
    }

    pub(crate) fn op_size(&self) -> usize {
        self.op_size.max(1)
    }

    pub(crate) fn max_high_ops(&self) -> usize {
        self.max_high_ops.max(1)
    }
}

/// Upload and download scheduling for a [`NetworkManager`](crate::net::NetworkManager).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub upload: SchedulerConfig,
    pub download: SchedulerConfig,
}

impl NetworkConfig {
    /// Limits in bytes per second, 0 = unlimited.
    pub fn with_limits(upload_limit: u64, download_limit: u64) -> Self {
        Self {
            upload: SchedulerConfig::default().with_rate_limit(upload_limit),
            download: SchedulerConfig::default().with_rate_limit(download_limit),
        }
    }
}
