pub mod constants;
pub mod frame;
pub mod frame_pool;
pub mod stream_metadata;
