use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capture::domain::capture_request::{CaptureFailure, CaptureMetadata, CaptureOutcome};
use crate::capture::domain::capture_sink::{CaptureCallback, CaptureSink};
use crate::capture::domain::image_writer::ImageWriter;
use crate::shared::frame::Frame;

/// Saves each capture as a timestamp-named image in one directory.
///
/// Every save runs on its own thread; the frame is released there once the
/// file is written (or the write has failed), right before the callback.
pub struct ImageFileCaptureSink {
    output_dir: PathBuf,
    writer: Arc<dyn ImageWriter>,
    extension: String,
}

impl ImageFileCaptureSink {
    pub fn new(output_dir: impl Into<PathBuf>, writer: Arc<dyn ImageWriter>) -> Self {
        Self {
            output_dir: output_dir.into(),
            writer,
            extension: "jpg".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path_for(&self, metadata: &CaptureMetadata) -> PathBuf {
        self.output_dir.join(metadata.file_name(&self.extension))
    }
}

impl CaptureSink for ImageFileCaptureSink {
    fn save(&self, frame: Frame, metadata: CaptureMetadata, on_result: CaptureCallback) {
        let path = self.path_for(&metadata);
        let writer = self.writer.clone();

        std::thread::spawn(move || {
            let written = writer.write(&path, &frame).map_err(|e| e.to_string());
            frame.release();

            let outcome = match written {
                Ok(()) => CaptureOutcome::Saved(path),
                Err(cause) => CaptureOutcome::Failed(CaptureFailure::Save(cause)),
            };
            on_result(outcome);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::infrastructure::image_file_writer::ImageFileWriter;
    use crate::shared::frame::Rotation;
    use crate::shared::frame_pool::FramePool;
    use chrono::Local;
    use std::time::Duration;

    struct FailingWriter;

    impl ImageWriter for FailingWriter {
        fn write(&self, _path: &Path, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            Err("disk full".into())
        }
    }

    fn metadata(id: u64) -> CaptureMetadata {
        CaptureMetadata {
            request_id: id,
            created_at: Local::now(),
            frame_index: 0,
        }
    }

    fn save_and_wait(sink: &ImageFileCaptureSink, frame: Frame, id: u64) -> CaptureOutcome {
        let (tx, rx) = crossbeam_channel::bounded(1);
        sink.save(
            frame,
            metadata(id),
            Box::new(move |outcome| {
                tx.send(outcome).unwrap();
            }),
        );
        rx.recv_timeout(Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_saves_into_output_dir_and_releases_frame() {
        let dir = tempfile::tempdir().unwrap();
        let pool = FramePool::new(1).unwrap();
        let frame = pool
            .acquire(vec![10u8; 16 * 16 * 3], 16, 16, 3, Rotation::Deg0)
            .unwrap();
        let sink = ImageFileCaptureSink::new(dir.path(), Arc::new(ImageFileWriter::new()));

        let outcome = save_and_wait(&sink, frame, 1);

        match outcome {
            CaptureOutcome::Saved(path) => {
                assert!(path.starts_with(dir.path()));
                assert!(path.exists());
                assert_eq!(path.extension().unwrap(), "jpg");
            }
            other => panic!("expected Saved, got {other:?}"),
        }
        assert_eq!(pool.released(), 1);
    }

    #[test]
    fn test_write_failure_reports_failed_and_releases_frame() {
        let pool = FramePool::new(1).unwrap();
        let frame = pool
            .acquire(vec![0u8; 12], 2, 2, 3, Rotation::Deg0)
            .unwrap();
        let sink = ImageFileCaptureSink::new("/unused", Arc::new(FailingWriter));

        let outcome = save_and_wait(&sink, frame, 1);

        assert_eq!(
            outcome,
            CaptureOutcome::Failed(CaptureFailure::Save("disk full".into()))
        );
        assert_eq!(pool.released(), 1);
    }

    #[test]
    fn test_extension_override() {
        let sink = ImageFileCaptureSink::new("/out", Arc::new(ImageFileWriter::new()))
            .with_extension(".png");
        let path = sink.path_for(&metadata(3));
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(sink.output_dir(), Path::new("/out"));
    }
}
