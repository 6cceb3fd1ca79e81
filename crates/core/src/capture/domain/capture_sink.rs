use crate::capture::domain::capture_request::{CaptureMetadata, CaptureOutcome};
use crate::shared::frame::Frame;

/// One-shot completion for a capture. Being `FnOnce`, it cannot fire twice.
pub type CaptureCallback = Box<dyn FnOnce(CaptureOutcome) + Send>;

/// Persists a still image for an accepted capture request.
///
/// Implementations take ownership of the frame and must not block the
/// caller: the work happens on the sink's own execution context, and
/// `on_result` is invoked once when it is done. A sink that drops the
/// callback without calling it leaves the request to the gate's abandonment
/// and timeout handling.
pub trait CaptureSink: Send + Sync {
    fn save(&self, frame: Frame, metadata: CaptureMetadata, on_result: CaptureCallback);
}
