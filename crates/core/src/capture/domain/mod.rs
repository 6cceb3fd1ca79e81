pub mod capture_gate;
pub mod capture_request;
pub mod capture_sink;
pub mod image_writer;
