use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::detection::domain::detection_result::{Analysis, DetectionResult};
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;

#[derive(Error, Debug, PartialEq)]
pub enum DetectorError {
    /// The worker died while holding the frame; the frame was released with it.
    #[error("detector worker stopped while analysing frame {frame_index}")]
    WorkerLost { frame_index: usize },
}

struct Job {
    frame: Frame,
    reply: Sender<Analysis>,
}

/// Runs a [`FaceDetector`] on a dedicated worker thread.
///
/// `analyze` moves the frame to the worker and returns at once; the result
/// comes back through a one-shot [`PendingDetection`] together with the frame.
/// The worker never releases frames it was given, and a panicking model is
/// reported as `DetectionFailed` instead of taking the worker down.
pub struct ThreadedFaceDetector {
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedFaceDetector {
    pub fn spawn(detector: Box<dyn FaceDetector>) -> Self {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<Job>();
        let worker = std::thread::spawn(move || run_worker(detector, jobs_rx));
        Self {
            jobs: Some(jobs_tx),
            worker: Some(worker),
        }
    }

    pub fn analyze(&self, frame: Frame) -> PendingDetection {
        let frame_index = frame.index();
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);

        let job = Job {
            frame,
            reply: reply_tx,
        };
        let rejected = match &self.jobs {
            Some(jobs) => jobs.send(job).err().map(|e| e.into_inner()),
            None => Some(job),
        };

        match rejected {
            None => PendingDetection {
                frame_index,
                state: PendingState::Waiting(reply_rx),
            },
            Some(job) => PendingDetection {
                frame_index,
                state: PendingState::Ready(Analysis {
                    frame: job.frame,
                    result: DetectionResult::DetectionFailed(
                        "detector worker is not running".into(),
                    ),
                }),
            },
        }
    }
}

impl Drop for ThreadedFaceDetector {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Detector worker panicked");
            }
        }
    }
}

enum PendingState {
    Waiting(Receiver<Analysis>),
    Ready(Analysis),
}

/// Handle to one in-flight analysis. Yields exactly one [`Analysis`].
pub struct PendingDetection {
    frame_index: usize,
    state: PendingState,
}

impl PendingDetection {
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Blocks until the worker reports back.
    pub fn wait(self) -> Result<Analysis, DetectorError> {
        match self.state {
            PendingState::Ready(analysis) => Ok(analysis),
            PendingState::Waiting(reply) => reply.recv().map_err(|_| DetectorError::WorkerLost {
                frame_index: self.frame_index,
            }),
        }
    }
}

fn run_worker(mut detector: Box<dyn FaceDetector>, jobs: Receiver<Job>) {
    for Job { frame, reply } in jobs {
        let start = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&frame))) {
            Ok(Ok(faces)) => DetectionResult::from_face_count(faces.len()),
            Ok(Err(e)) => DetectionResult::DetectionFailed(e.to_string()),
            Err(payload) => DetectionResult::DetectionFailed(panic_message(payload.as_ref())),
        };
        log::trace!(
            "Frame {} analysed in {:.1}ms: {:?}",
            frame.index(),
            start.elapsed().as_secs_f64() * 1000.0,
            result
        );

        // A caller that stopped listening leaves the frame in the send error,
        // which drops (and releases) it here.
        let _ = reply.send(Analysis { frame, result });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("detector panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("detector panicked: {s}")
    } else {
        "detector panicked".to_string()
    }
}
