use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::shared::frame::{Frame, FrameRecycler, Rotation};

/// Fixed set of frame buffers shared between a producer and its consumers.
///
/// Mirrors a camera's image reader: only `capacity` frames may be alive at
/// once. A consumer that never releases its frames starves the producer,
/// which makes leaks visible instead of silent. The counters let callers
/// check that every issued frame came back exactly once.
#[derive(Clone)]
pub struct FramePool {
    counters: Arc<PoolCounters>,
}

struct PoolCounters {
    capacity: usize,
    outstanding: AtomicUsize,
    issued: AtomicUsize,
    released: AtomicUsize,
}

impl FrameRecycler for PoolCounters {
    fn recycle(&self, _index: usize) {
        self.released.fetch_add(1, Ordering::AcqRel);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl FramePool {
    pub fn new(capacity: usize) -> Result<Self, &'static str> {
        if capacity < 1 {
            return Err("pool capacity must be >= 1");
        }
        Ok(Self {
            counters: Arc::new(PoolCounters {
                capacity,
                outstanding: AtomicUsize::new(0),
                issued: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
        })
    }

    /// Wraps pixel data in a pooled frame, or returns `None` when every
    /// buffer is still held by someone.
    pub fn acquire(
        &self,
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        rotation: Rotation,
    ) -> Option<Frame> {
        let c = &self.counters;
        c.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < c.capacity).then_some(n + 1)
            })
            .ok()?;

        let index = c.issued.fetch_add(1, Ordering::AcqRel);
        let recycler: Arc<dyn FrameRecycler> = self.counters.clone();
        Some(
            Frame::new(data, width, height, channels, index)
                .with_rotation(rotation)
                .with_recycler(recycler),
        )
    }

    pub fn capacity(&self) -> usize {
        self.counters.capacity
    }

    pub fn outstanding(&self) -> usize {
        self.counters.outstanding.load(Ordering::Acquire)
    }

    pub fn issued(&self) -> usize {
        self.counters.issued.load(Ordering::Acquire)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquire(pool: &FramePool) -> Option<Frame> {
        pool.acquire(vec![0u8; 12], 2, 2, 3, Rotation::Deg0)
    }

    #[test]
    fn test_zero_capacity_errors() {
        assert!(FramePool::new(0).is_err());
    }

    #[test]
    fn test_indices_are_sequential() {
        let pool = FramePool::new(3).unwrap();
        let a = acquire(&pool).unwrap();
        let b = acquire(&pool).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
    }

    #[test]
    fn test_exhausted_pool_refuses_new_frames() {
        let pool = FramePool::new(2).unwrap();
        let _a = acquire(&pool).unwrap();
        let _b = acquire(&pool).unwrap();

        assert!(acquire(&pool).is_none());
        assert_eq!(pool.outstanding(), 2);
        assert_eq!(pool.issued(), 2);
    }

    #[test]
    fn test_release_returns_buffer() {
        let pool = FramePool::new(1).unwrap();
        let frame = acquire(&pool).unwrap();
        assert!(acquire(&pool).is_none());

        frame.release();

        assert_eq!(pool.released(), 1);
        assert_eq!(pool.outstanding(), 0);
        assert!(acquire(&pool).is_some());
    }

    #[test]
    fn test_rotation_is_attached() {
        let pool = FramePool::new(1).unwrap();
        let frame = pool
            .acquire(vec![0u8; 12], 2, 2, 3, Rotation::Deg270)
            .unwrap();
        assert_eq!(frame.rotation(), Rotation::Deg270);
    }

    #[test]
    fn test_concurrent_acquire_respects_capacity() {
        let pool = FramePool::new(4).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || acquire(&pool))
            })
            .collect();
        let frames: Vec<Frame> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(frames.len(), 4);
        drop(frames);
        assert_eq!(pool.released(), 4);
        assert_eq!(pool.outstanding(), 0);
    }
}
