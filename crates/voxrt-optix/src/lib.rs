//! # Node-graph ray-tracing backend for mixed mesh / volume scenes
//!
//! Builds and drives a scene hierarchy in which triangle meshes and sparse
//! volumes share one top-level acceleration structure, each primitive kind
//! bringing its own intersection and bounding-box programs. The device itself
//! sits behind [`device::Device`]; the raster side (output display, volume
//! atlas) behind [`interop::RasterInterop`]. Both have in-memory
//! implementations so scenes can be built, validated and launched headless.
//!
//! ```no_run
//! use voxrt::{geometry::Matrix4x4, mesh::InterleavedMesh};
//! use voxrt_optix::{HostDevice, HostRaster, Scene, SceneSettings};
//!
//! # fn main() -> Result<(), voxrt_optix::SceneError> {
//! let device = HostDevice::new("ptx");
//! let mut scene = Scene::initialize(device, HostRaster::new(), SceneSettings::default(), 640, 480)?;
//! let material = scene.add_material("optix_trace_surface", "trace_surface", "trace_shadow")?;
//! scene.add_mesh(&InterleavedMesh::unit_cube(), material, &Matrix4x4::identity())?;
//! scene.validate()?;
//! scene.launch()?;
//! # Ok(())
//! # }
//! ```

pub mod bindings;
pub mod bridge;
pub mod device;
pub mod frame;
pub mod graph;
pub mod interop;
pub mod launch;
pub mod materials;
pub mod programs;

mod context;
mod error;
mod macros;
mod scene;
mod settings;

#[cfg(test)]
mod tests;

pub use device::{HostDevice, LaunchRecord, ObjectKind};
pub use error::{ErrorKind, SceneError, SceneResult};
pub use frame::{FrameParams, ShadingMode};
pub use graph::VolumeIntersect;
pub use interop::{AtlasTexture, HostRaster};
pub use launch::GraphState;
pub use scene::Scene;
pub use settings::{ProgramModules, SceneSettings};
