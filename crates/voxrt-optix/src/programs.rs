use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    bindings,
    device::{Device, ProgramHandle},
    error::{ResultExt, SceneResult},
    settings::ProgramModules,
};

/// Device programs keyed by (module, symbol). Each distinct pair is compiled once.
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    loaded: HashMap<(PathBuf, String), ProgramHandle>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        module: &Path,
        symbol: &str,
    ) -> SceneResult<ProgramHandle> {
        let key = (module.to_path_buf(), symbol.to_string());
        if let Some(&program) = self.loaded.get(&key) {
            return Ok(program);
        }

        let program = device
            .create_program(module, symbol)
            .creating(format!("program `{symbol}` from {}", module.display()))?;
        debug!("loaded program `{symbol}` from {}", module.display());
        self.loaded.insert(key, program);
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

/// Programs every scene needs, loaded eagerly at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPrograms {
    pub ray_generation: ProgramHandle,
    pub exception: ProgramHandle,
    pub miss: ProgramHandle,
    pub mesh_intersect: ProgramHandle,
    pub mesh_bounds: ProgramHandle,
    pub volume_surface: ProgramHandle,
    pub volume_level_set: ProgramHandle,
    pub volume_deep: ProgramHandle,
    pub volume_bounds: ProgramHandle,
}

impl FixedPrograms {
    pub fn load<D: Device + ?Sized>(
        registry: &mut ProgramRegistry,
        device: &mut D,
        modules: &ProgramModules,
    ) -> SceneResult<Self> {
        let mut load = |module: &Path, symbol: &str| registry.load(&mut *device, module, symbol);

        Ok(Self {
            ray_generation: load(&modules.trace, bindings::TRACE_PRIMARY)?,
            exception: load(&modules.trace, bindings::EXCEPTION)?,
            miss: load(&modules.miss, bindings::MISS)?,
            mesh_intersect: load(&modules.mesh, bindings::MESH_INTERSECT)?,
            mesh_bounds: load(&modules.mesh, bindings::MESH_BOUNDS)?,
            volume_surface: load(&modules.volume, bindings::VOL_INTERSECT)?,
            volume_level_set: load(&modules.volume, bindings::VOL_LEVELSET)?,
            volume_deep: load(&modules.volume, bindings::VOL_DEEP)?,
            volume_bounds: load(&modules.volume, bindings::VOL_BOUNDS)?,
        })
    }
}
