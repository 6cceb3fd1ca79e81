use std::time::Duration;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Directory under the user's pictures folder that receives captures.
pub const CAPTURE_DIR_NAME: &str = "FaceSnap";

pub const DEFAULT_FPS: f64 = 30.0;

/// Frame buffers the producer may have in flight at once.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// How long the analysis thread sleeps on an empty queue before re-checking
/// capture completions, the watchdog and cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A capture that has not reported back after this long is failed.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
