pub mod onnx_blazeface_detector;
pub mod threaded_face_detector;
