//! Adapter and pipeline configuration.
//!
//! Values can be set through [`AdapterBuilder`](crate::AdapterBuilder) or
//! loaded from JSON; missing fields take their defaults.
//!
//! ```
//! use sd_rpc_host::PipelineConfig;
//!
//! let config = PipelineConfig::from_json(r#"{ "event_interval_ms": 50 }"#).unwrap();
//! assert_eq!(config.event_interval_ms, 50);
//! assert_eq!(config.queue_capacity, 64);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Default number of entries each queue can hold.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Largest accepted queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 16;

/// Default name of the dispatch thread.
pub const DEFAULT_DISPATCH_THREAD_NAME: &str = "sd-rpc-dispatch";

/// Configuration for an adapter's event pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of each of the event, log and status queues, between 1 and
    /// [`MAX_QUEUE_CAPACITY`].
    pub queue_capacity: usize,
    /// Event batching interval in milliseconds; 0 dispatches every event
    /// as soon as it is queued.
    pub event_interval_ms: u64,
    /// Name given to the dispatch thread.
    pub thread_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_interval_ms: 0,
            thread_name: DEFAULT_DISPATCH_THREAD_NAME.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(DriverError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(DriverError::InvalidConfig(format!(
                "queue_capacity {} exceeds the maximum of {}",
                self.queue_capacity, MAX_QUEUE_CAPACITY
            )));
        }
        if self.thread_name.is_empty() {
            return Err(DriverError::InvalidConfig(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn event_interval(&self) -> Duration {
        Duration::from_millis(self.event_interval_ms)
    }
}
