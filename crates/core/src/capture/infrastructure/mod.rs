pub mod image_file_capture_sink;
pub mod image_file_writer;
