use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::{
    bindings,
    bridge::OutputSurface,
    device::{BufferDesc, BufferFormat, BufferHandle, BufferKind, Device, DeviceError, Node, Scope, Value, fill_buffer},
    error::{ResultExt, SceneResult},
    interop::RasterInterop,
    programs::{FixedPrograms, ProgramRegistry},
    settings::SceneSettings,
};

/// Context-wide state that outlives every graph rebuild: global
/// configuration, loaded programs, the output surface and the per-pixel
/// seed buffer.
#[derive(Debug)]
pub struct DeviceContext {
    pub settings: SceneSettings,
    pub programs: ProgramRegistry,
    pub fixed: FixedPrograms,
    pub output: OutputSurface,
    pub seeds: BufferHandle,
}

impl DeviceContext {
    pub fn create<D, R>(
        device: &mut D,
        raster: &mut R,
        settings: SceneSettings,
        width: usize,
        height: usize,
    ) -> SceneResult<Self>
    where
        D: Device + ?Sized,
        R: RasterInterop + ?Sized,
    {
        info!("creating device context");
        device
            .set_entry_point_count(settings.entry_point_count)
            .creating("context entry points")?;
        device
            .set_ray_type_count(settings.ray_type_count)
            .creating("context ray types")?;
        device.set_stack_size(settings.stack_size).creating("context stack")?;
        device
            .set_variable(Scope::Context, bindings::SCENE_EPSILON, Value::Float(settings.scene_epsilon))
            .creating(format!("`{}`", bindings::SCENE_EPSILON))?;

        let output = OutputSurface::create(device, raster, settings.output_format, width, height)?;
        device
            .set_variable(Scope::Context, bindings::OUTPUT_BUFFER, Value::Buffer(output.buffer()))
            .creating(format!("`{}` binding", bindings::OUTPUT_BUFFER))?;

        info!("loading device programs");
        let mut programs = ProgramRegistry::new();
        let fixed = FixedPrograms::load(&mut programs, device, &settings.modules)?;

        device
            .set_ray_generation_program(0, fixed.ray_generation)
            .creating("ray generation binding")?;
        device
            .set_exception_program(0, fixed.exception)
            .creating("exception binding")?;
        device
            .set_variable(Scope::Context, bindings::BAD_COLOR, Value::Float3(settings.bad_color))
            .creating(format!("`{}`", bindings::BAD_COLOR))?;
        device
            .set_miss_program(bindings::RADIANCE_RAY, fixed.miss)
            .creating("miss binding")?;

        info!("creating random seed buffer");
        let seeds = create_seed_buffer(device, settings.seed, width, height)?;

        Ok(Self {
            settings,
            programs,
            fixed,
            output,
            seeds,
        })
    }

    pub fn destroy<D, R>(self, device: &mut D, raster: &mut R) -> SceneResult<()>
    where
        D: Device + ?Sized,
        R: RasterInterop + ?Sized,
    {
        device
            .destroy(Node::Buffer(self.seeds))
            .creating("seed buffer teardown")?;
        self.output.destroy(device, raster)
    }
}

/// Per-pixel RNG seeds in `0..=0xffff`
fn create_seed_buffer<D: Device + ?Sized>(
    device: &mut D,
    seed: Option<u64>,
    width: usize,
    height: usize,
) -> SceneResult<BufferHandle> {
    let desc = BufferDesc::image(
        BufferKind::INPUT_OUTPUT | BufferKind::GPU_LOCAL,
        BufferFormat::UnsignedInt,
        width,
        height,
    );
    let buffer = device.create_buffer(desc).creating(format!("`{}` buffer", bindings::RND_SEEDS))?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or_else(rand::random));
    fill_buffer(device, buffer, |bytes| {
        for seed in bytes.chunks_exact_mut(4) {
            seed.copy_from_slice(&(rng.next_u32() & 0xffff).to_ne_bytes());
        }
        Ok::<(), DeviceError>(())
    })
    .creating(format!("`{}` buffer", bindings::RND_SEEDS))?;

    device
        .set_variable(Scope::Context, bindings::RND_SEEDS, Value::Buffer(buffer))
        .creating(format!("`{}` binding", bindings::RND_SEEDS))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostDevice;

    fn seeds(seed: Option<u64>) -> Vec<u32> {
        let mut device = HostDevice::new(".");
        let buffer = create_seed_buffer(&mut device, seed, 4, 3).unwrap();
        device
            .read_buffer(buffer)
            .unwrap()
            .chunks_exact(4)
            .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn seed_buffer_covers_every_pixel() {
        let values = seeds(Some(7));
        assert_eq!(values.len(), 12);
        assert!(values.iter().all(|&v| v <= 0xffff));
        assert!(values.iter().any(|&v| v != values[0]));
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        assert_eq!(seeds(Some(42)), seeds(Some(42)));
    }
}
