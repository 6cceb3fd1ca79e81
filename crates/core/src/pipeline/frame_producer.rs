use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::camera::domain::frame_source::{FrameSource, FrameSourceError};
use crate::pipeline::frame_queue::{LatestFrameQueue, PublishOutcome};
use crate::shared::frame::Rotation;
use crate::shared::frame_pool::FramePool;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub images_read: u64,
    pub frames_published: u64,
    /// Publishes that displaced a frame the analysis thread never saw.
    pub frames_displaced: u64,
    /// Images skipped because every pool buffer was still in use.
    pub pool_exhausted: u64,
    pub read_errors: u64,
}

/// Pumps an opened [`FrameSource`] into `queue` on a dedicated thread.
///
/// Each image is wrapped in a pooled frame tagged with `rotation`. When the
/// pool is exhausted the image is skipped rather than waited for, the same
/// way a camera drops frames nobody has buffers for. `interval` paces
/// delivery; `None` publishes as fast as the source decodes.
///
/// The source is closed and the queue is closed when the stream ends or
/// `cancelled` is set.
pub fn spawn_producer(
    mut source: Box<dyn FrameSource>,
    interval: Option<Duration>,
    rotation: Rotation,
    pool: FramePool,
    queue: Arc<LatestFrameQueue>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<ProducerStats> {
    std::thread::spawn(move || {
        let mut stats = ProducerStats::default();
        let mut next_tick = Instant::now();

        while !cancelled.load(Ordering::Relaxed) && !queue.is_closed() {
            let Some(image) = source.next_image() else {
                break;
            };

            match image {
                Ok(image) => {
                    stats.images_read += 1;
                    let published = pool
                        .acquire(image.data, image.width, image.height, image.channels, rotation)
                        .map(|frame| queue.publish(frame));
                    match published {
                        Some(PublishOutcome::Stored) => stats.frames_published += 1,
                        Some(PublishOutcome::Replaced) => {
                            stats.frames_published += 1;
                            stats.frames_displaced += 1;
                        }
                        Some(PublishOutcome::Rejected) => break,
                        None => {
                            stats.pool_exhausted += 1;
                            log::trace!("Frame pool exhausted, skipping image");
                        }
                    }
                }
                Err(FrameSourceError::NotOpen) => {
                    log::error!("Frame source was not opened");
                    break;
                }
                // An unreadable image still uses up its tick.
                Err(e) => {
                    stats.read_errors += 1;
                    log::warn!("Skipping unreadable image: {e}");
                }
            }

            if let Some(interval) = interval {
                next_tick += interval;
                let now = Instant::now();
                if next_tick > now {
                    std::thread::sleep(next_tick - now);
                } else {
                    next_tick = now;
                }
            }
        }

        source.close();
        queue.close();
        log::debug!("Frame producer finished: {stats:?}");
        stats
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::domain::frame_source::CameraImage;
    use crate::shared::stream_metadata::StreamMetadata;
    use std::collections::VecDeque;
    use std::path::Path;

    struct StubSource {
        images: VecDeque<Result<CameraImage, FrameSourceError>>,
        closed: Arc<AtomicBool>,
    }

    impl StubSource {
        fn new(images: Vec<Result<CameraImage, FrameSourceError>>) -> (Self, Arc<AtomicBool>) {
            let closed = Arc::new(AtomicBool::new(false));
            (
                Self {
                    images: images.into(),
                    closed: closed.clone(),
                },
                closed,
            )
        }
    }

    impl FrameSource for StubSource {
        fn open(&mut self, _path: &Path) -> Result<StreamMetadata, FrameSourceError> {
            Ok(StreamMetadata {
                width: 2,
                height: 2,
                fps: 0.0,
                total_frames: Some(self.images.len()),
                source_path: None,
            })
        }

        fn next_image(&mut self) -> Option<Result<CameraImage, FrameSourceError>> {
            self.images.pop_front()
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::Relaxed);
        }
    }

    fn image() -> Result<CameraImage, FrameSourceError> {
        Ok(CameraImage {
            data: vec![0u8; 12],
            width: 2,
            height: 2,
            channels: 3,
        })
    }

    fn run(
        images: Vec<Result<CameraImage, FrameSourceError>>,
        pool: &FramePool,
        queue: &Arc<LatestFrameQueue>,
    ) -> (ProducerStats, bool) {
        let (source, closed) = StubSource::new(images);
        let stats = spawn_producer(
            Box::new(source),
            None,
            Rotation::Deg90,
            pool.clone(),
            queue.clone(),
            Arc::new(AtomicBool::new(false)),
        )
        .join()
        .unwrap();
        (stats, closed.load(Ordering::Relaxed))
    }

    #[test]
    fn test_latest_image_survives_and_others_are_released() {
        let pool = FramePool::new(4).unwrap();
        let queue = Arc::new(LatestFrameQueue::new());

        let (stats, source_closed) = run(vec![image(), image(), image()], &pool, &queue);

        assert_eq!(stats.images_read, 3);
        assert_eq!(stats.frames_published, 3);
        assert_eq!(stats.frames_displaced, 2);
        assert!(source_closed);
        assert!(queue.is_closed());
        assert_eq!(pool.released(), 2);

        let last = queue.take().unwrap();
        assert_eq!(last.index(), 2);
        assert_eq!(last.rotation(), Rotation::Deg90);
    }

    #[test]
    fn test_read_errors_are_skipped() {
        let pool = FramePool::new(4).unwrap();
        let queue = Arc::new(LatestFrameQueue::new());
        let bad = Err(FrameSourceError::Empty("/nowhere".into()));

        let (stats, _) = run(vec![bad, image()], &pool, &queue);

        assert_eq!(stats.read_errors, 1);
        assert_eq!(stats.frames_published, 1);
    }

    #[test]
    fn test_exhausted_pool_skips_images() {
        let pool = FramePool::new(1).unwrap();
        let held = pool.acquire(vec![0u8; 12], 2, 2, 3, Rotation::Deg0).unwrap();
        let queue = Arc::new(LatestFrameQueue::new());

        let (stats, _) = run(vec![image(), image()], &pool, &queue);

        assert_eq!(stats.pool_exhausted, 2);
        assert_eq!(stats.frames_published, 0);
        assert!(queue.is_drained());
        held.release();
    }

    /// Fails every read, like a looping camera stuck on a corrupt image.
    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn open(&mut self, _path: &Path) -> Result<StreamMetadata, FrameSourceError> {
            Err(FrameSourceError::Empty("/broken".into()))
        }

        fn next_image(&mut self) -> Option<Result<CameraImage, FrameSourceError>> {
            Some(Err(FrameSourceError::Empty("/broken".into())))
        }

        fn close(&mut self) {}
    }

    #[test]
    fn test_read_errors_are_paced() {
        let pool = FramePool::new(4).unwrap();
        let queue = Arc::new(LatestFrameQueue::new());
        let cancelled = Arc::new(AtomicBool::new(false));

        let handle = spawn_producer(
            Box::new(BrokenSource),
            Some(Duration::from_millis(10)),
            Rotation::Deg0,
            pool,
            queue,
            cancelled.clone(),
        );
        std::thread::sleep(Duration::from_millis(100));
        cancelled.store(true, Ordering::Relaxed);
        let stats = handle.join().unwrap();

        assert!(stats.read_errors >= 1);
        assert!(stats.read_errors <= 20, "{} reads", stats.read_errors);
    }

    #[test]
    fn test_unopened_source_stops_producer() {
        let pool = FramePool::new(4).unwrap();
        let queue = Arc::new(LatestFrameQueue::new());

        let (stats, _) = run(vec![Err(FrameSourceError::NotOpen), image()], &pool, &queue);

        assert_eq!(stats.images_read, 0);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_closed_queue_stops_producer_immediately() {
        let pool = FramePool::new(4).unwrap();
        let queue = Arc::new(LatestFrameQueue::new());
        queue.close();

        let (stats, source_closed) = run(vec![image()], &pool, &queue);

        assert_eq!(stats.images_read, 0);
        assert!(source_closed);
    }
}
