use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::capture::domain::capture_request::{
    CaptureFailure, CaptureMetadata, CaptureOutcome, CaptureRecord,
};

/// Single-flight latch for still captures.
///
/// At most one [`CaptureRequest`] exists at a time. The first caller to find
/// the gate idle gets the request; everyone else gets `None` and is expected
/// to drop their attempt, not queue it. Completing the request (or dropping
/// it) reopens the gate.
///
/// Cloning the gate shares the same latch.
#[derive(Clone, Default)]
pub struct CaptureGate {
    shared: Arc<GateShared>,
}

#[derive(Default)]
struct GateShared {
    state: Mutex<GateState>,
}

#[derive(Default)]
struct GateState {
    in_flight: Option<InFlight>,
    last: Option<CaptureRecord>,
    started: u64,
}

struct InFlight {
    request_id: u64,
    frame_index: usize,
    started_at: Instant,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the gate if it is idle.
    pub fn try_begin_capture(
        &self,
        timestamp_hint: DateTime<Local>,
        frame_index: usize,
    ) -> Option<CaptureRequest> {
        let mut state = self.shared.lock();
        if state.in_flight.is_some() {
            return None;
        }

        state.started += 1;
        let request_id = state.started;
        let started_at = Instant::now();
        state.in_flight = Some(InFlight {
            request_id,
            frame_index,
            started_at,
        });

        Some(CaptureRequest {
            metadata: CaptureMetadata {
                request_id,
                created_at: timestamp_hint,
                frame_index,
            },
            gate: self.shared.clone(),
            finished: false,
        })
    }

    /// Terminates `request` with `outcome` and reopens the gate.
    ///
    /// Returns `None` if the request had already been expired by
    /// [`CaptureGate::expire_stale`].
    pub fn complete_capture(
        &self,
        request: CaptureRequest,
        outcome: CaptureOutcome,
    ) -> Option<CaptureRecord> {
        request.complete(outcome)
    }

    /// Fails the in-flight request if it has been running for `timeout` or
    /// longer. A late completion of that request is then ignored.
    pub fn expire_stale(&self, timeout: Duration) -> Option<CaptureRecord> {
        let mut state = self.shared.lock();
        let stale = state
            .in_flight
            .as_ref()
            .is_some_and(|f| f.started_at.elapsed() >= timeout);
        if !stale {
            return None;
        }
        let in_flight = state.in_flight.take()?;
        let record = CaptureRecord {
            request_id: in_flight.request_id,
            frame_index: in_flight.frame_index,
            outcome: CaptureOutcome::Failed(CaptureFailure::TimedOut(timeout)),
            elapsed: in_flight.started_at.elapsed(),
        };
        state.last = Some(record.clone());
        Some(record)
    }

    pub fn is_idle(&self) -> bool {
        self.shared.lock().in_flight.is_none()
    }

    /// Most recent terminated request.
    pub fn last_record(&self) -> Option<CaptureRecord> {
        self.shared.lock().last.clone()
    }

    pub fn captures_started(&self) -> u64 {
        self.shared.lock().started
    }
}

impl GateShared {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        // The state stays consistent across a panic: every mutation is a
        // single assignment made while holding the lock.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, request_id: u64, outcome: CaptureOutcome) -> Option<CaptureRecord> {
        let mut state = self.lock();
        match &state.in_flight {
            Some(f) if f.request_id == request_id => {}
            _ => {
                log::debug!("Ignoring late completion of capture #{request_id}");
                return None;
            }
        }
        let in_flight = state.in_flight.take()?;
        let record = CaptureRecord {
            request_id,
            frame_index: in_flight.frame_index,
            outcome,
            elapsed: in_flight.started_at.elapsed(),
        };
        state.last = Some(record.clone());
        Some(record)
    }
}

/// The one capture currently allowed by a [`CaptureGate`].
///
/// Completing consumes the request, so it can terminate only once. Dropping
/// an uncompleted request terminates it as [`CaptureFailure::Abandoned`].
pub struct CaptureRequest {
    metadata: CaptureMetadata,
    gate: Arc<GateShared>,
    finished: bool,
}

impl CaptureRequest {
    pub fn id(&self) -> u64 {
        self.metadata.request_id
    }

    pub fn metadata(&self) -> &CaptureMetadata {
        &self.metadata
    }

    pub fn complete(mut self, outcome: CaptureOutcome) -> Option<CaptureRecord> {
        self.finished = true;
        self.gate.finish(self.metadata.request_id, outcome)
    }
}

impl Drop for CaptureRequest {
    fn drop(&mut self) {
        if !self.finished {
            self.gate.finish(
                self.metadata.request_id,
                CaptureOutcome::Failed(CaptureFailure::Abandoned),
            );
        }
    }
}

impl std::fmt::Debug for CaptureRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureRequest")
            .field("metadata", &self.metadata)
            .field("finished", &self.finished)
            .finish()
    }
}
