use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::shared::constants::{DEFAULT_CAPTURE_TIMEOUT, DEFAULT_POLL_INTERVAL};

/// Configuration for a pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Longest the analysis thread sleeps on an empty queue.
    pub poll_interval: Duration,
    /// Watchdog for captures that never report back. `None` disables it.
    pub capture_timeout: Option<Duration>,
    /// Stop after this many saved captures; 0 runs until the stream ends.
    pub max_captures: usize,
    pub cancelled: Arc<AtomicBool>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            capture_timeout: Some(DEFAULT_CAPTURE_TIMEOUT),
            max_captures: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}
