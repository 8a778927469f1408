//! Configuration knobs for the shadow index, scanner, monitor, and queue.
//!
//! All fields carry defaults so an embedder can progressively override just
//! the knobs it cares about.

use serde::{Deserialize, Serialize};

/// Filesystem watch debounce and batching configuration, plus service-loop
/// cadence.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Tick interval for the service loop that drains add/remove requests
    /// and flushes pending Shadow Index mutations.
    pub service_tick_ms: u64,
    /// Bound on the add/remove request channels.
    pub request_channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            service_tick_ms: 500,
            request_channel_capacity: 64,
        }
    }
}

/// Sizing knobs for the persistent queue's in-memory prefetch window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Upper bound on the in-memory prefetch window.
    pub max_in_memory: usize,
    /// Refill threshold: a reload is triggered once the window shrinks
    /// below this many entries.
    pub min_in_memory: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_in_memory: 100,
            min_in_memory: 50,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_in_memory > self.max_in_memory {
            return Err(format!(
                "min_in_memory ({}) must not exceed max_in_memory ({})",
                self.min_in_memory, self.max_in_memory
            ));
        }
        Ok(())
    }
}
