use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::shared::frame::Frame;

/// What happened to a frame handed to [`LatestFrameQueue::publish`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The slot was empty.
    Stored,
    /// An unconsumed frame was released to make room.
    Replaced,
    /// The queue is closed; the incoming frame was released.
    Rejected,
}

/// Single-slot, latest-wins hand-off between the camera and the analyser.
///
/// The producer never waits: publishing over an unconsumed frame releases
/// that frame and keeps the new one, so the consumer always works on the
/// freshest image and memory stays bounded at one frame.
pub struct LatestFrameQueue {
    slot: Mutex<Slot>,
    ready: Condvar,
}

#[derive(Default)]
struct Slot {
    pending: Option<Frame>,
    closed: bool,
    published: u64,
    dropped: u64,
}

impl LatestFrameQueue {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            ready: Condvar::new(),
        }
    }

    /// Stores `frame` as the pending frame. A displaced frame is released
    /// before this returns, outside the critical section.
    pub fn publish(&self, frame: Frame) -> PublishOutcome {
        let displaced = {
            let mut slot = self.lock();
            if slot.closed {
                drop(slot);
                frame.release();
                return PublishOutcome::Rejected;
            }
            slot.published += 1;
            let displaced = slot.pending.replace(frame);
            if displaced.is_some() {
                slot.dropped += 1;
            }
            displaced
        };
        self.ready.notify_one();

        match displaced {
            Some(old) => {
                log::trace!("Frame {} superseded before analysis", old.index());
                old.release();
                PublishOutcome::Replaced
            }
            None => PublishOutcome::Stored,
        }
    }

    /// Removes and returns the pending frame without waiting.
    pub fn take(&self) -> Option<Frame> {
        self.lock().pending.take()
    }

    /// Like [`LatestFrameQueue::take`], but sleeps up to `timeout` for a
    /// frame to arrive. Returns early once the queue is closed.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Frame> {
        let guard = self.lock();
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |s| s.pending.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        slot.pending.take()
    }

    /// Marks the end of the stream and wakes the consumer. A frame already
    /// pending can still be taken.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Closed with nothing left to take.
    pub fn is_drained(&self) -> bool {
        let slot = self.lock();
        slot.closed && slot.pending.is_none()
    }

    pub fn published(&self) -> u64 {
        self.lock().published
    }

    /// Frames released because a newer one arrived before they were taken.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LatestFrameQueue {
    fn default() -> Self {
        Self::new()
    }
}
