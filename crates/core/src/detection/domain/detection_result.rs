use crate::shared::frame::Frame;

/// Outcome of analysing one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionResult {
    /// At least one face; carries the number of faces seen.
    FaceFound(usize),
    NoFace,
    /// The model could not analyse the frame. Frame-scoped and recoverable.
    DetectionFailed(String),
}

impl DetectionResult {
    pub fn from_face_count(count: usize) -> Self {
        if count == 0 {
            DetectionResult::NoFace
        } else {
            DetectionResult::FaceFound(count)
        }
    }

    /// Only a found face may start a capture; failures count as "no face".
    pub fn should_trigger(&self) -> bool {
        matches!(self, DetectionResult::FaceFound(_))
    }
}

/// A detection result paired with the frame it was computed from.
///
/// The detector hands the frame back here, so ownership returns to whoever
/// asked for the analysis and that caller decides when to release it.
#[derive(Debug)]
pub struct Analysis {
    pub frame: Frame,
    pub result: DetectionResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, DetectionResult::NoFace)]
    #[case(1, DetectionResult::FaceFound(1))]
    #[case(3, DetectionResult::FaceFound(3))]
    fn test_from_face_count(#[case] count: usize, #[case] expected: DetectionResult) {
        assert_eq!(DetectionResult::from_face_count(count), expected);
    }

    #[rstest]
    #[case(DetectionResult::FaceFound(2), true)]
    #[case(DetectionResult::NoFace, false)]
    #[case(DetectionResult::DetectionFailed("model error".into()), false)]
    fn test_should_trigger(#[case] result: DetectionResult, #[case] expected: bool) {
        assert_eq!(result.should_trigger(), expected);
    }
}
