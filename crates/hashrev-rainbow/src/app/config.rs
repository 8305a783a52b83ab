//! Engine configuration

use crate::app::progress::FlushPolicy;
use crate::constants::{
    DEFAULT_CHAIN_COUNT, DEFAULT_CHAIN_LENGTH, DEFAULT_LENGTH_SPREAD, DEFAULT_MIN_LENGTH,
    FLUSH_INTERVAL, SIGNIFICANT_PROGRESS_DELTA,
};
use std::time::Duration;

/// Lookup engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Progress delta (percentage points) that forces a durable write
    pub significant_progress_delta: u8,
    /// Minimum spacing between unforced durable writes of one task
    pub flush_interval: Duration,
    /// Chains generated when a request asks for none
    pub default_chain_count: usize,
    /// Chain length used when a request asks for zero
    pub default_chain_length: u32,
    /// Minimum plaintext length used when a request asks for zero
    pub default_min_length: usize,
    /// Added to min length when max is missing or smaller than min
    pub default_length_spread: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            significant_progress_delta: SIGNIFICANT_PROGRESS_DELTA,
            flush_interval: FLUSH_INTERVAL,
            default_chain_count: DEFAULT_CHAIN_COUNT,
            default_chain_length: DEFAULT_CHAIN_LENGTH,
            default_min_length: DEFAULT_MIN_LENGTH,
            default_length_spread: DEFAULT_LENGTH_SPREAD,
        }
    }
}

impl EngineConfig {
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_significant_progress_delta(mut self, delta: u8) -> Self {
        self.significant_progress_delta = delta;
        self
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::new(self.significant_progress_delta, self.flush_interval)
    }
}
