//! Scene inputs shared by the ray-tracing backends: small math types laid out
//! the way device programs read them, interleaved mesh sources, the camera
//! basis and the volume transfer function.

pub mod camera;
pub mod geometry;
pub mod mesh;
pub mod transfer;

mod error;

pub use error::SourceError;
