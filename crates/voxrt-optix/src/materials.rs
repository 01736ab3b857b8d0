use std::path::PathBuf;

use tracing::debug;

use crate::{
    bindings,
    device::{Device, MaterialHandle, Node, ProgramHandle, Scope, Value},
    error::{ResultExt, SceneError, SceneResult},
    programs::ProgramRegistry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub handle: MaterialHandle,
    pub closest_hit: ProgramHandle,
    pub any_hit: ProgramHandle,
    params: Vec<u8>,
}

impl Material {
    pub fn params(&self) -> &[u8] {
        &self.params
    }
}

/// Append-only list of materials, addressed by index. Indices stay valid
/// until the whole table is cleared.
#[derive(Debug)]
pub struct MaterialTable {
    entries: Vec<Material>,
    params_size: usize,
}

impl MaterialTable {
    pub fn new(params_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            params_size,
        }
    }

    /// Loads `cast` and `shadow` out of `<module>.ptx` and appends a material
    /// with a zeroed parameter block. Returns the new index.
    pub fn add<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        programs: &mut ProgramRegistry,
        module: &str,
        cast: &str,
        shadow: &str,
    ) -> SceneResult<usize> {
        let path = PathBuf::from(format!("{module}.ptx"));
        let closest_hit = programs.load(device, &path, cast)?;
        let any_hit = programs.load(device, &path, shadow)?;

        let handle = device.create_material().creating("material")?;
        device
            .set_closest_hit_program(handle, bindings::RADIANCE_RAY, closest_hit)
            .creating(format!("closest hit binding for `{cast}`"))?;
        device
            .set_any_hit_program(handle, bindings::SHADOW_RAY, any_hit)
            .creating(format!("any hit binding for `{shadow}`"))?;

        let params = vec![0; self.params_size];
        device
            .set_variable(Scope::Material(handle), bindings::MAT, Value::UserData(params.clone()))
            .creating("material parameter block")?;

        self.entries.push(Material {
            handle,
            closest_hit,
            any_hit,
            params,
        });

        let index = self.entries.len() - 1;
        debug!("material {index}: {module} ({cast}, {shadow})");
        Ok(index)
    }

    /// Replaces the parameter block of material `index` and republishes it
    pub fn set_params<D: Device + ?Sized>(&mut self, device: &mut D, index: usize, params: &[u8]) -> SceneResult<()> {
        if params.len() != self.params_size {
            return Err(SceneError::BlobSize {
                what: "material parameter block",
                expected: self.params_size,
                actual: params.len(),
            });
        }
        let count = self.entries.len();
        let material = self
            .entries
            .get_mut(index)
            .ok_or(SceneError::MaterialIndex { index, count })?;

        material.params.copy_from_slice(params);
        device
            .set_variable(
                Scope::Material(material.handle),
                bindings::MAT,
                Value::UserData(material.params.clone()),
            )
            .creating("material parameter block")?;
        Ok(())
    }

    pub fn get(&self, index: usize) -> SceneResult<&Material> {
        self.entries.get(index).ok_or(SceneError::MaterialIndex {
            index,
            count: self.entries.len(),
        })
    }

    pub fn params(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).map(Material::params)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.entries.iter()
    }

    /// Destroys every material. Programs stay loaded.
    pub fn clear<D: Device + ?Sized>(&mut self, device: &mut D) -> SceneResult<()> {
        for material in self.entries.drain(..) {
            device
                .destroy(Node::Material(material.handle))
                .creating("material teardown")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{device::HostDevice, error::ErrorKind};

    fn table() -> (tempfile::TempDir, HostDevice, ProgramRegistry) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("optix_trace_surface.ptx"),
            ".entry trace_surface(\n)\n.entry trace_shadow(\n)\n",
        )
        .unwrap();
        let mut device = HostDevice::new(dir.path());
        device.set_ray_type_count(2).unwrap();
        (dir, device, ProgramRegistry::new())
    }

    #[test]
    fn materials_bind_hit_programs_per_ray_type() {
        let (_dir, mut device, mut programs) = table();
        let mut materials = MaterialTable::new(8);

        let first = materials
            .add(&mut device, &mut programs, "optix_trace_surface", "trace_surface", "trace_shadow")
            .unwrap();
        let second = materials
            .add(&mut device, &mut programs, "optix_trace_surface", "trace_surface", "trace_shadow")
            .unwrap();
        assert_eq!((first, second), (0, 1));

        let m = materials.get(0).unwrap();
        assert_eq!(device.closest_hit_program(m.handle, bindings::RADIANCE_RAY), Some(m.closest_hit));
        assert_eq!(device.any_hit_program(m.handle, bindings::SHADOW_RAY), Some(m.any_hit));
        assert_eq!(device.closest_hit_program(m.handle, bindings::SHADOW_RAY), None);
        assert_eq!(
            device.variable(Scope::Material(m.handle), bindings::MAT),
            Some(&Value::UserData(vec![0; 8]))
        );
    }

    #[test]
    fn params_are_checked_and_republished() {
        let (_dir, mut device, mut programs) = table();
        let mut materials = MaterialTable::new(4);
        materials
            .add(&mut device, &mut programs, "optix_trace_surface", "trace_surface", "trace_shadow")
            .unwrap();

        materials.set_params(&mut device, 0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(materials.params(0), Some(&[1u8, 2, 3, 4][..]));
        let handle = materials.get(0).unwrap().handle;
        assert_eq!(
            device.variable(Scope::Material(handle), bindings::MAT),
            Some(&Value::UserData(vec![1, 2, 3, 4]))
        );

        let err = materials.set_params(&mut device, 0, &[1, 2]).unwrap_err();
        assert!(matches!(err, SceneError::BlobSize { expected: 4, actual: 2, .. }));

        let err = materials.set_params(&mut device, 3, &[0; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn clear_destroys_materials_but_keeps_programs() {
        let (_dir, mut device, mut programs) = table();
        let mut materials = MaterialTable::new(4);
        materials
            .add(&mut device, &mut programs, "optix_trace_surface", "trace_surface", "trace_shadow")
            .unwrap();

        materials.clear(&mut device).unwrap();
        assert!(materials.is_empty());
        assert_eq!(device.live_count(crate::device::ObjectKind::Material), 0);
        assert_eq!(device.live_count(crate::device::ObjectKind::Program), 2);
    }
}
