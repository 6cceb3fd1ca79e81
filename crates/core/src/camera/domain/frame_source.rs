use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::stream_metadata::StreamMetadata;

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no images found in {0}")]
    Empty(PathBuf),
    #[error("frame source has not been opened")]
    NotOpen,
}

/// One raw image as delivered by the camera, before it enters a frame pool.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Push-style camera session seen from the producer thread.
///
/// Implementations own device binding and decoding; the pipeline only sees
/// [`CameraImage`]s and [`StreamMetadata`].
pub trait FrameSource: Send {
    /// Starts the session and describes the stream.
    fn open(&mut self, path: &Path) -> Result<StreamMetadata, FrameSourceError>;

    /// Next image in delivery order, or `None` once the stream has ended.
    fn next_image(&mut self) -> Option<Result<CameraImage, FrameSourceError>>;

    /// Releases any resources held by the source.
    fn close(&mut self);
}
