use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureFailure {
    #[error("capture did not report back within {0:?}")]
    TimedOut(Duration),
    #[error("capture was dropped before reporting a result")]
    Abandoned,
    #[error("capture could not be saved: {0}")]
    Save(String),
}

/// Terminal state of one capture request.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Saved(PathBuf),
    Failed(CaptureFailure),
}

impl CaptureOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, CaptureOutcome::Saved(_))
    }
}

/// What the capture sink learns about the request it is serving.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureMetadata {
    pub request_id: u64,
    pub created_at: DateTime<Local>,
    /// Index of the frame whose detection triggered the capture.
    pub frame_index: usize,
}

impl CaptureMetadata {
    /// Timestamp-derived file name, e.g. `IMG_20240131_235959_042_7.jpg`.
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "IMG_{}_{}.{extension}",
            self.created_at.format("%Y%m%d_%H%M%S_%3f"),
            self.request_id
        )
    }
}

/// A finished request as remembered by the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    pub request_id: u64,
    pub frame_index: usize,
    pub outcome: CaptureOutcome,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metadata() -> CaptureMetadata {
        CaptureMetadata {
            request_id: 7,
            created_at: Local.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
            frame_index: 12,
        }
    }

    #[test]
    fn test_file_name_uses_creation_time_and_id() {
        assert_eq!(metadata().file_name("jpg"), "IMG_20240131_235959_000_7.jpg");
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            CaptureFailure::Save("disk full".into()).to_string(),
            "capture could not be saved: disk full"
        );
        assert!(CaptureFailure::TimedOut(Duration::from_secs(3))
            .to_string()
            .contains("3s"));
    }

    #[test]
    fn test_is_saved() {
        assert!(CaptureOutcome::Saved(PathBuf::from("a.jpg")).is_saved());
        assert!(!CaptureOutcome::Failed(CaptureFailure::Abandoned).is_saved());
    }
}
