use crate::detection::domain::face_box::FaceBox;
use crate::shared::frame::Frame;

/// Domain interface for the face-detection model.
///
/// Implementations may keep inference state between calls, hence `&mut self`.
/// Boxes are reported in sensor orientation; an empty vector means no face.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>>;
}
