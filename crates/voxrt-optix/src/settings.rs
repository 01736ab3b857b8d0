use std::path::PathBuf;

use crate::device::BufferFormat;

/// Device program modules, relative to the device's program search path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramModules {
    /// ray generation and exception programs
    pub trace: PathBuf,
    pub miss: PathBuf,
    pub mesh: PathBuf,
    pub volume: PathBuf,
}

impl Default for ProgramModules {
    fn default() -> Self {
        Self {
            trace: PathBuf::from("optix_trace_primary.ptx"),
            miss: PathBuf::from("optix_trace_miss.ptx"),
            mesh: PathBuf::from("optix_mesh_intersect.ptx"),
            volume: PathBuf::from("optix_vol_intersect.ptx"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneSettings {
    pub entry_point_count: u32,
    pub ray_type_count: u32,
    pub stack_size: usize,
    pub scene_epsilon: f32,
    pub bad_color: [f32; 3],
    pub output_format: BufferFormat,
    pub modules: ProgramModules,

    /// size of a material parameter block
    pub material_params_size: usize,
    /// size of the serialized volume descriptor
    pub volume_descriptor_size: usize,

    /// seed for the per-pixel RNG seed buffer; `None` draws from the thread RNG
    pub seed: Option<u64>,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            entry_point_count: 1,
            ray_type_count: 2,
            stack_size: 4200,
            scene_epsilon: 1.0e-6,
            bad_color: [0.0; 3],
            output_format: BufferFormat::Float3,
            modules: ProgramModules::default(),
            material_params_size: 256,
            volume_descriptor_size: 512,
            seed: None,
        }
    }
}
