//! BlazeFace (short-range) face detector running on ONNX Runtime via `ort`.
//!
//! The pipeline only needs to know whether a face is present, so this
//! detector stops at de-duplicated bounding boxes: no landmarks, no tracking.
use std::path::Path;

use crate::detection::domain::face_box::FaceBox;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;

/// Model input resolution (square).
const INPUT_SIZE: u32 = 128;

/// Boxes overlapping more than this are treated as the same face.
const NMS_IOU_THRESH: f64 = 0.3;

const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: box (4) + 6 keypoints (12).
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f32,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence must be between 0.0 and 1.0, got {confidence}").into());
        }
        log::info!("Loading BlazeFace model from {}", model_path.display());
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;
        Ok(Self {
            session,
            confidence: confidence as f32,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        if frame.channels() < 3 {
            return Err(format!("expected an RGB frame, got {} channels", frame.channels()).into());
        }

        let input = ort::value::Tensor::from_array(preprocess(frame, INPUT_SIZE))?;
        let outputs = self.session.run(ort::inputs![input])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into());
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let regressors = regressors.as_slice().ok_or("regressor tensor is not contiguous")?;
        let scores = scores.as_slice().ok_or("score tensor is not contiguous")?;

        let candidates = decode(
            &self.anchors,
            regressors,
            scores,
            self.confidence,
            (frame.width(), frame.height()),
        );
        Ok(non_max_suppression(candidates, NMS_IOU_THRESH))
    }
}

/// Nearest-neighbour resize to `size × size`, scaled to [0, 1], NCHW.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let (src_h, src_w) = (frame.height() as usize, frame.width() as usize);
    let s = size as usize;

    let sample = |dst: usize, src_len: usize| {
        (((dst as f64 + 0.5) * src_len as f64 / s as f64) as usize).min(src_len - 1)
    };

    ndarray::Array4::from_shape_fn((1, 3, s, s), |(_, c, y, x)| {
        src[[sample(y, src_h), sample(x, src_w), c]] as f32 / 255.0
    })
}

/// Anchor centres for the short-range model: a 16×16 grid with 2 anchors
/// per cell followed by an 8×8 grid with 6 anchors per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (stride, per_cell) in [(8usize, 2usize), (16, 6)] {
        let grid = INPUT_SIZE as usize / stride;
        for y in 0..grid {
            for x in 0..grid {
                let centre = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat(centre).take(per_cell));
            }
        }
    }
    anchors
}

/// Turns raw model outputs into frame-space boxes above `confidence`.
fn decode(
    anchors: &[[f32; 2]],
    regressors: &[f32],
    scores: &[f32],
    confidence: f32,
    (frame_w, frame_h): (u32, u32),
) -> Vec<FaceBox> {
    let input = INPUT_SIZE as f32;
    let (fw, fh) = (frame_w as f32, frame_h as f32);

    anchors
        .iter()
        .zip(scores)
        .zip(regressors.chunks_exact(REGRESSOR_STRIDE))
        .filter_map(|((anchor, &raw), reg)| {
            let score = sigmoid(raw);
            if score < confidence {
                return None;
            }
            let cx = anchor[0] + reg[0] / input;
            let cy = anchor[1] + reg[1] / input;
            let (w, h) = (reg[2] / input, reg[3] / input);

            let x1 = ((cx - w / 2.0) * fw).clamp(0.0, fw);
            let y1 = ((cy - h / 2.0) * fh).clamp(0.0, fh);
            let x2 = ((cx + w / 2.0) * fw).clamp(0.0, fw);
            let y2 = ((cy + h / 2.0) * fh).clamp(0.0, fh);
            if x2 <= x1 || y2 <= y1 {
                return None;
            }
            Some(FaceBox {
                x: x1 as f64,
                y: y1 as f64,
                width: (x2 - x1) as f64,
                height: (y2 - y1) as f64,
                score: score as f64,
            })
        })
        .collect()
}

/// Greedy NMS: keeps the highest-scoring box of every overlapping cluster.
fn non_max_suppression(mut candidates: Vec<FaceBox>, iou_thresh: f64) -> Vec<FaceBox> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<FaceBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_thresh) {
            kept.push(candidate);
        }
    }
    kept
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn face(x: f64, y: f64, size: f64, score: f64) -> FaceBox {
        FaceBox {
            x,
            y,
            width: size,
            height: size,
            score,
        }
    }

    #[test]
    fn test_preprocess_shape_and_scale() {
        let frame = Frame::new(vec![255u8; 200 * 100 * 3], 200, 100, 3, 0);
        let tensor = preprocess(&frame, 128);
        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
        assert_abs_diff_eq!(tensor[[0, 2, 127, 127]], 1.0);
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        // 1x1 frame: R=255, G=0, B=51
        let frame = Frame::new(vec![255, 0, 51], 1, 1, 3, 0);
        let tensor = preprocess(&frame, 4);
        assert_abs_diff_eq!(tensor[[0, 0, 3, 3]], 1.0);
        assert_abs_diff_eq!(tensor[[0, 1, 0, 0]], 0.0);
        assert_abs_diff_eq!(tensor[[0, 2, 1, 2]], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_generate_anchors() {
        let anchors = generate_anchors();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert!(anchors
            .iter()
            .all(|a| a[0] > 0.0 && a[0] < 1.0 && a[1] > 0.0 && a[1] < 1.0));
    }

    #[test]
    fn test_sigmoid() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5, epsilon = 1e-6);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        let anchors = vec![[0.5, 0.5], [0.25, 0.25]];
        let mut regressors = vec![0.0f32; 2 * REGRESSOR_STRIDE];
        // both anchors predict a 32x32 box (in model pixels)
        regressors[2] = 32.0;
        regressors[3] = 32.0;
        regressors[REGRESSOR_STRIDE + 2] = 32.0;
        regressors[REGRESSOR_STRIDE + 3] = 32.0;
        let scores = vec![5.0, -5.0];

        let boxes = decode(&anchors, &regressors, &scores, 0.5, (256, 256));

        assert_eq!(boxes.len(), 1);
        // centre 0.5 * 256 = 128, size 0.25 * 256 = 64
        assert_abs_diff_eq!(boxes[0].x, 96.0, epsilon = 1e-3);
        assert_abs_diff_eq!(boxes[0].width, 64.0, epsilon = 1e-3);
    }

    #[test]
    fn test_decode_clamps_to_frame() {
        let anchors = vec![[0.0, 0.0]];
        let mut regressors = vec![0.0f32; REGRESSOR_STRIDE];
        regressors[2] = 64.0;
        regressors[3] = 64.0;

        let boxes = decode(&anchors, &regressors, &[5.0], 0.5, (100, 100));

        assert_eq!(boxes.len(), 1);
        assert_abs_diff_eq!(boxes[0].x, 0.0);
        assert_abs_diff_eq!(boxes[0].width, 25.0, epsilon = 1e-3);
    }

    #[test]
    fn test_decode_skips_empty_boxes() {
        let anchors = vec![[0.5, 0.5]];
        let regressors = vec![0.0f32; REGRESSOR_STRIDE];
        assert!(decode(&anchors, &regressors, &[5.0], 0.5, (100, 100)).is_empty());
    }

    #[test]
    fn test_nms_suppresses_overlap_keeping_best() {
        let kept = non_max_suppression(
            vec![face(5.0, 5.0, 100.0, 0.7), face(0.0, 0.0, 100.0, 0.9)],
            0.3,
        );
        assert_eq!(kept.len(), 1);
        assert_abs_diff_eq!(kept[0].score, 0.9);
    }

    #[test]
    fn test_nms_keeps_separate_faces() {
        let kept = non_max_suppression(
            vec![face(0.0, 0.0, 50.0, 0.9), face(200.0, 200.0, 50.0, 0.8)],
            0.3,
        );
        assert_eq!(kept.len(), 2);
    }
}
