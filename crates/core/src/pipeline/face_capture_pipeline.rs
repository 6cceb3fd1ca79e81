use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::Local;
use crossbeam_channel::{Receiver, Sender};

use crate::capture::domain::capture_gate::{CaptureGate, CaptureRequest};
use crate::capture::domain::capture_request::{CaptureFailure, CaptureOutcome, CaptureRecord};
use crate::capture::domain::capture_sink::CaptureSink;
use crate::detection::domain::detection_result::{Analysis, DetectionResult};
use crate::detection::infrastructure::threaded_face_detector::ThreadedFaceDetector;
use crate::pipeline::frame_queue::LatestFrameQueue;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::pipeline_logger::{PipelineEvent, PipelineLogger};
use crate::shared::frame::Frame;

/// Where the analysis loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    AwaitingFrame,
    Analyzing,
    /// Analysis finished without a face; the frame is being released.
    Idle,
    /// A face was found and the capture gate is being consulted.
    Triggering,
}

/// Result of one [`FaceCapturePipeline::step`].
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// No frame arrived within the poll interval.
    Waiting,
    Analyzed(DetectionResult),
    /// Cancelled, capture limit reached, or the stream ended.
    Finished,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_analyzed: u64,
    pub faces_found: u64,
    pub detection_failures: u64,
    pub captures_started: u64,
    pub captures_rejected: u64,
    pub captures_saved: u64,
    pub captures_failed: u64,
    /// Frames the queue released unanalysed because a newer one arrived.
    pub frames_dropped: u64,
}

/// Face-triggered capture loop.
///
/// Layout: `producer → queue → [analysis thread] → detector worker`, and on a
/// face, `capture gate → capture sink (own thread)`.
///
/// The analysis thread owns every frame it takes until it either releases
/// it or hands it to the capture sink. It never waits for a capture: sink
/// completions come back over a channel and are folded in between frames.
pub struct FaceCapturePipeline {
    queue: Arc<LatestFrameQueue>,
    detector: ThreadedFaceDetector,
    gate: CaptureGate,
    sink: Arc<dyn CaptureSink>,
    logger: Box<dyn PipelineLogger>,
    config: PipelineConfig,
    reports_tx: Sender<CaptureRecord>,
    reports_rx: Receiver<CaptureRecord>,
    state: PipelineState,
    stats: PipelineStats,
    /// Started captures whose record has not been folded in yet.
    captures_pending: u64,
}

impl FaceCapturePipeline {
    pub fn new(
        queue: Arc<LatestFrameQueue>,
        detector: ThreadedFaceDetector,
        sink: Arc<dyn CaptureSink>,
        logger: Box<dyn PipelineLogger>,
        config: PipelineConfig,
    ) -> Self {
        let (reports_tx, reports_rx) = crossbeam_channel::unbounded();
        Self {
            queue,
            detector,
            gate: CaptureGate::new(),
            sink,
            logger,
            config,
            reports_tx,
            reports_rx,
            state: PipelineState::AwaitingFrame,
            stats: PipelineStats::default(),
            captures_pending: 0,
        }
    }

    /// The queue producers publish into.
    pub fn frame_queue(&self) -> Arc<LatestFrameQueue> {
        self.queue.clone()
    }

    pub fn capture_gate(&self) -> CaptureGate {
        self.gate.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Runs one iteration: fold in capture completions, enforce the capture
    /// watchdog, then analyse at most one frame.
    pub fn step(&mut self) -> Step {
        self.drain_capture_reports();
        self.run_watchdog();

        if self.should_stop() {
            return Step::Finished;
        }

        match self.queue.take_timeout(self.config.poll_interval) {
            Some(frame) => Step::Analyzed(self.process_frame(frame)),
            None if self.queue.is_drained() => Step::Finished,
            None => Step::Waiting,
        }
    }

    /// Runs until cancelled, the capture limit is hit, or the queue is
    /// closed and drained; then waits for an in-flight capture to settle.
    pub fn run(mut self) -> PipelineStats {
        self.logger.info("Face capture pipeline started");
        while self.step() != Step::Finished {}

        self.settle_in_flight_capture();
        self.stats.frames_dropped = self.queue.dropped();
        self.logger
            .metric("frames_dropped", self.stats.frames_dropped as f64);
        self.logger.summary();
        self.stats.clone()
    }

    /// Runs the pipeline on its own thread.
    pub fn spawn(self) -> PipelineHandle {
        let cancelled = self.config.cancelled.clone();
        let queue = self.queue.clone();
        let join = std::thread::spawn(move || self.run());
        PipelineHandle {
            cancelled,
            queue,
            join,
        }
    }

    fn process_frame(&mut self, frame: Frame) -> DetectionResult {
        let frame_index = frame.index();
        self.state = PipelineState::Analyzing;
        self.stats.frames_analyzed += 1;

        let start = Instant::now();
        let Analysis { frame, result } = match self.detector.analyze(frame).wait() {
            Ok(analysis) => analysis,
            Err(e) => {
                // The worker took the frame down with it.
                let result = DetectionResult::DetectionFailed(e.to_string());
                self.report_detection_failure(frame_index, e.to_string());
                self.state = PipelineState::AwaitingFrame;
                return result;
            }
        };
        self.logger
            .timing("detect", start.elapsed().as_secs_f64() * 1000.0);

        if result.should_trigger() {
            self.stats.faces_found += 1;
            self.state = PipelineState::Triggering;
            self.trigger_capture(frame);
        } else {
            self.state = PipelineState::Idle;
            frame.release();
            if let DetectionResult::DetectionFailed(cause) = &result {
                self.report_detection_failure(frame_index, cause.clone());
            }
        }

        self.state = PipelineState::AwaitingFrame;
        result
    }

    fn trigger_capture(&mut self, frame: Frame) {
        let frame_index = frame.index();
        if self.capture_limit_reached() {
            log::debug!("Capture limit reached, ignoring face in frame {frame_index}");
            frame.release();
            return;
        }
        let Some(request) = self.gate.try_begin_capture(Local::now(), frame_index) else {
            frame.release();
            self.stats.captures_rejected += 1;
            self.logger
                .event(&PipelineEvent::CaptureRejected { frame_index });
            return;
        };

        self.stats.captures_started += 1;
        self.captures_pending += 1;
        self.logger.event(&PipelineEvent::CaptureStarted {
            request_id: request.id(),
            frame_index,
        });

        let metadata = request.metadata().clone();
        let reporter = CaptureReporter {
            request: Some(request),
            reports: self.reports_tx.clone(),
        };
        self.sink
            .save(frame, metadata, Box::new(move |outcome| reporter.report(outcome)));
    }

    fn report_detection_failure(&mut self, frame_index: usize, cause: String) {
        self.stats.detection_failures += 1;
        self.logger
            .event(&PipelineEvent::DetectionFailed { frame_index, cause });
    }

    fn drain_capture_reports(&mut self) {
        while let Ok(record) = self.reports_rx.try_recv() {
            self.record_capture(record);
        }
    }

    fn run_watchdog(&mut self) {
        let Some(timeout) = self.config.capture_timeout else {
            return;
        };
        if let Some(record) = self.gate.expire_stale(timeout) {
            self.record_capture(record);
        }
    }

    fn record_capture(&mut self, record: CaptureRecord) {
        self.captures_pending = self.captures_pending.saturating_sub(1);
        self.logger
            .timing("capture", record.elapsed.as_secs_f64() * 1000.0);
        match record.outcome {
            CaptureOutcome::Saved(path) => {
                self.stats.captures_saved += 1;
                self.logger.event(&PipelineEvent::CaptureSaved {
                    request_id: record.request_id,
                    path,
                });
            }
            CaptureOutcome::Failed(cause) => {
                self.stats.captures_failed += 1;
                self.logger.event(&PipelineEvent::CaptureFailed {
                    request_id: record.request_id,
                    cause,
                });
            }
        }
    }

    fn should_stop(&self) -> bool {
        self.config.cancelled.load(Ordering::Relaxed)
            || (self.config.max_captures > 0
                && self.stats.captures_saved >= self.config.max_captures as u64)
    }

    /// Counts captures that may still succeed, so a completion that has not
    /// been drained yet cannot let an extra capture through.
    fn capture_limit_reached(&self) -> bool {
        self.config.max_captures > 0
            && self.stats.captures_saved + self.captures_pending >= self.config.max_captures as u64
    }

    /// Waits until every started capture has reported. Bounded by the
    /// watchdog; skipped once cancelled.
    ///
    /// The gate reopens before the record is sent, so an idle gate does not
    /// mean the record has arrived yet.
    fn settle_in_flight_capture(&mut self) {
        while self.captures_pending > 0 && !self.config.cancelled.load(Ordering::Relaxed) {
            if let Ok(record) = self.reports_rx.recv_timeout(self.config.poll_interval) {
                self.record_capture(record);
            }
            self.run_watchdog();
        }
        self.drain_capture_reports();
    }
}

/// Completes the capture request exactly once and tells the pipeline.
///
/// If the sink drops its callback without calling it, the request is
/// completed as abandoned here instead of waiting for the watchdog.
struct CaptureReporter {
    request: Option<CaptureRequest>,
    reports: Sender<CaptureRecord>,
}

impl CaptureReporter {
    fn report(mut self, outcome: CaptureOutcome) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: CaptureOutcome) {
        if let Some(record) = self.request.take().and_then(|r| r.complete(outcome)) {
            let _ = self.reports.send(record);
        }
    }
}

impl Drop for CaptureReporter {
    fn drop(&mut self) {
        self.finish(CaptureOutcome::Failed(CaptureFailure::Abandoned));
    }
}

/// A pipeline running on its own thread.
pub struct PipelineHandle {
    cancelled: Arc<AtomicBool>,
    queue: Arc<LatestFrameQueue>,
    join: JoinHandle<PipelineStats>,
}

impl PipelineHandle {
    pub fn frame_queue(&self) -> Arc<LatestFrameQueue> {
        self.queue.clone()
    }

    /// Asks the pipeline to stop after the frame it is working on.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.queue.close();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn join(self) -> Result<PipelineStats, Box<dyn std::error::Error>> {
        self.join
            .join()
            .map_err(|_| "Pipeline thread panicked".into())
    }
}
