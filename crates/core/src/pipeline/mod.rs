pub mod face_capture_pipeline;
pub mod frame_producer;
pub mod frame_queue;
pub mod pipeline_config;
pub mod pipeline_logger;
