use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use crate::capture::domain::capture_request::CaptureFailure;

/// Notable things the pipeline reports while it runs.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    DetectionFailed { frame_index: usize, cause: String },
    CaptureStarted { request_id: u64, frame_index: usize },
    /// A face was found while another capture was still in flight.
    CaptureRejected { frame_index: usize },
    CaptureSaved { request_id: u64, path: PathBuf },
    CaptureFailed { request_id: u64, cause: CaptureFailure },
}

impl PipelineEvent {
    /// Stable key used for per-kind counters.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::DetectionFailed { .. } => "detection_failed",
            PipelineEvent::CaptureStarted { .. } => "capture_started",
            PipelineEvent::CaptureRejected { .. } => "capture_rejected",
            PipelineEvent::CaptureSaved { .. } => "capture_saved",
            PipelineEvent::CaptureFailed { .. } => "capture_failed",
        }
    }
}

/// Observability sink for pipeline orchestration.
///
/// Called from the analysis thread only. Implementations must return
/// quickly: the pipeline does not wait on them for anything.
pub trait PipelineLogger: Send {
    /// Report a structured pipeline event.
    fn event(&mut self, event: &PipelineEvent);

    /// Record how long a named stage took for one frame or capture.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric.
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn event(&mut self, _event: &PipelineEvent) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Forwards events to the `log` crate at a level matching their severity
/// and keeps enough bookkeeping for an end-of-run summary.
pub struct LogPipelineLogger {
    counts: HashMap<&'static str, u64>,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
}

impl LogPipelineLogger {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.counts.get(kind).copied().unwrap_or(0)
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.counts.is_empty() && self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!("Pipeline summary ({elapsed_s:.1}s):")];

        let mut kinds: Vec<_> = self.counts.iter().collect();
        kinds.sort();
        for (kind, n) in kinds {
            lines.push(format!("  {kind:18}: {n}"));
        }

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:18}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms  n={}",
                durations.len()
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        Some(lines.join("\n"))
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn event(&mut self, event: &PipelineEvent) {
        *self.counts.entry(event.kind()).or_default() += 1;

        match event {
            PipelineEvent::DetectionFailed { frame_index, cause } => {
                log::warn!("Face detection failed on frame {frame_index}: {cause}");
            }
            PipelineEvent::CaptureStarted {
                request_id,
                frame_index,
            } => {
                log::info!("Face detected on frame {frame_index}, starting capture #{request_id}");
            }
            PipelineEvent::CaptureRejected { frame_index } => {
                log::debug!("Capture already in flight, skipping frame {frame_index}");
            }
            PipelineEvent::CaptureSaved { request_id, path } => {
                log::info!("Capture #{request_id} saved to {}", path.display());
            }
            PipelineEvent::CaptureFailed { request_id, cause } => {
                log::error!("Capture #{request_id} failed: {cause}");
            }
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(id: u64) -> PipelineEvent {
        PipelineEvent::CaptureSaved {
            request_id: id,
            path: PathBuf::from("/tmp/IMG.jpg"),
        }
    }

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullPipelineLogger;
        logger.event(&saved(1));
        logger.timing("detect", 5.0);
        logger.metric("queue_dropped", 3.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_events_are_counted_by_kind() {
        let mut logger = LogPipelineLogger::new();
        logger.event(&saved(1));
        logger.event(&saved(2));
        logger.event(&PipelineEvent::CaptureRejected { frame_index: 3 });

        assert_eq!(logger.count("capture_saved"), 2);
        assert_eq!(logger.count("capture_rejected"), 1);
        assert_eq!(logger.count("detection_failed"), 0);
    }

    #[test]
    fn test_timing_and_metrics_are_recorded() {
        let mut logger = LogPipelineLogger::new();
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.metric("queue_dropped", 4.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.metrics_for("queue_dropped").unwrap(), &[4.0]);
        assert!(logger.timings_for("capture").is_none());
    }

    #[test]
    fn test_summary_lists_counts_timings_and_metrics() {
        let mut logger = LogPipelineLogger::new();
        logger.event(&PipelineEvent::DetectionFailed {
            frame_index: 1,
            cause: "boom".into(),
        });
        logger.timing("detect", 10.0);
        logger.timing("detect", 30.0);
        logger.metric("queue_dropped", 2.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Pipeline summary"));
        assert!(summary.contains("detection_failed"));
        assert!(summary.contains("avg   20.0ms"));
        assert!(summary.contains("max   30.0ms"));
        assert!(summary.contains("queue_dropped: avg 2.0"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogPipelineLogger::new().summary_string().is_none());
    }

    #[test]
    fn test_event_kinds_are_distinct() {
        let events = [
            PipelineEvent::DetectionFailed {
                frame_index: 0,
                cause: String::new(),
            },
            PipelineEvent::CaptureStarted {
                request_id: 1,
                frame_index: 0,
            },
            PipelineEvent::CaptureRejected { frame_index: 0 },
            saved(1),
            PipelineEvent::CaptureFailed {
                request_id: 1,
                cause: CaptureFailure::Abandoned,
            },
        ];
        let mut kinds: Vec<_> = events.iter().map(PipelineEvent::kind).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), events.len());
    }
}
