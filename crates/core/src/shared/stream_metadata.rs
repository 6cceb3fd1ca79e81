use std::path::PathBuf;

/// Describes a live frame stream once its source has been opened.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Number of frames per pass, when the source knows it up front.
    pub total_frames: Option<usize>,
    pub source_path: Option<PathBuf>,
}

impl StreamMetadata {
    /// Interval between two frames at the stream rate, or `None` for an
    /// unpaced stream.
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        (self.fps > 0.0).then(|| std::time::Duration::from_secs_f64(1.0 / self.fps))
    }
}
