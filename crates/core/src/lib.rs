pub mod camera;
pub mod capture;
pub mod detection;
pub mod pipeline;
pub mod shared;
