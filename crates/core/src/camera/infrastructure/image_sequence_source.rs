use std::path::{Path, PathBuf};

use crate::camera::domain::frame_source::{CameraImage, FrameSource, FrameSourceError};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::stream_metadata::StreamMetadata;

/// Replays still images as a camera stream.
///
/// Opens either a single image or a directory of images (sorted by file
/// name). Images are decoded lazily, one per tick, as RGB. With `looping`
/// the sequence restarts after the last image, which behaves like a camera
/// that keeps delivering frames until stopped.
pub struct ImageSequenceSource {
    fps: f64,
    looping: bool,
    paths: Vec<PathBuf>,
    cursor: usize,
    source_path: Option<PathBuf>,
}

impl ImageSequenceSource {
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            looping: false,
            paths: Vec::new(),
            cursor: 0,
            source_path: None,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    fn collect_paths(path: &Path) -> Result<Vec<PathBuf>, FrameSourceError> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }

        let io_err = |source| FrameSourceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(path).map_err(io_err)? {
            let entry_path = entry.map_err(io_err)?.path();
            if entry_path.is_file() && is_image(&entry_path) {
                paths.push(entry_path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self, path: &Path) -> Result<StreamMetadata, FrameSourceError> {
        let paths = Self::collect_paths(path)?;
        let first = paths
            .first()
            .ok_or_else(|| FrameSourceError::Empty(path.to_path_buf()))?;
        let (width, height) = image::image_dimensions(first).map_err(|e| FrameSourceError::Decode {
            path: first.clone(),
            source: e,
        })?;

        log::info!(
            "Opened {} image(s) from {} at {:.1} fps{}",
            paths.len(),
            path.display(),
            self.fps,
            if self.looping { " (looping)" } else { "" }
        );

        let total_frames = Some(paths.len());
        self.paths = paths;
        self.cursor = 0;
        self.source_path = Some(path.to_path_buf());

        Ok(StreamMetadata {
            width,
            height,
            fps: self.fps,
            total_frames,
            source_path: self.source_path.clone(),
        })
    }

    fn next_image(&mut self) -> Option<Result<CameraImage, FrameSourceError>> {
        if self.source_path.is_none() {
            return Some(Err(FrameSourceError::NotOpen));
        }
        if self.cursor >= self.paths.len() {
            if !self.looping || self.paths.is_empty() {
                return None;
            }
            self.cursor = 0;
        }

        let path = self.paths[self.cursor].clone();
        self.cursor += 1;

        Some(
            image::open(&path)
                .map(|img| {
                    let rgb = img.into_rgb8();
                    CameraImage {
                        width: rgb.width(),
                        height: rgb.height(),
                        channels: 3,
                        data: rgb.into_raw(),
                    }
                })
                .map_err(|e| FrameSourceError::Decode { path, source: e }),
        )
    }

    fn close(&mut self) {
        self.paths.clear();
        self.cursor = 0;
        self.source_path = None;
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
