use tracing::info;
use voxrt::{
    camera::CameraBasis,
    geometry::{AABB, Matrix4x4, Vec3},
    mesh::InterleavedMesh,
    transfer::TransferFunction,
};

use crate::{
    bridge::{OutputSurface, VolumeSampler},
    context::DeviceContext,
    device::{BufferHandle, Device, SamplerHandle},
    error::SceneResult,
    frame::{FrameParams, FrameSink, ShadingMode},
    graph::{SceneGraph, VolumeIntersect},
    interop::{AtlasTexture, RasterInterop},
    launch::{GraphState, LaunchController},
    materials::MaterialTable,
    programs::FixedPrograms,
    settings::SceneSettings,
};

/// A ray-traced scene mixing triangle meshes and sparse volumes.
///
/// Owns the device and raster backends for its whole lifetime;
/// [`Scene::teardown`] releases every device object and hands them back.
pub struct Scene<D: Device, R: RasterInterop> {
    device: D,
    raster: R,
    context: DeviceContext,
    materials: MaterialTable,
    graph: SceneGraph,
    frame: FrameSink,
    sampler: VolumeSampler,
    controller: LaunchController,
}

impl<D: Device, R: RasterInterop> Scene<D, R> {
    /// Sets up the context, the fixed programs, an output surface of
    /// `width` x `height` and an empty top-level group. Every frame parameter
    /// is published with its default so the scene validates before the first
    /// frame is configured.
    pub fn initialize(
        mut device: D,
        mut raster: R,
        settings: SceneSettings,
        width: usize,
        height: usize,
    ) -> SceneResult<Self> {
        let materials = MaterialTable::new(settings.material_params_size);
        let descriptor_size = settings.volume_descriptor_size;

        let context = DeviceContext::create(&mut device, &mut raster, settings, width, height)?;

        let mut frame = FrameSink::create(&mut device, descriptor_size)?;
        frame.publish(&mut device)?;

        info!("creating top-level group");
        let graph = SceneGraph::create(&mut device)?;

        Ok(Self {
            device,
            raster,
            context,
            materials,
            graph,
            frame,
            sampler: VolumeSampler::new(),
            controller: LaunchController::new(),
        })
    }

    pub fn add_material(&mut self, module: &str, cast: &str, shadow: &str) -> SceneResult<usize> {
        self.materials
            .add(&mut self.device, &mut self.context.programs, module, cast, shadow)
    }

    pub fn set_material_params(&mut self, index: usize, params: &[u8]) -> SceneResult<()> {
        self.materials.set_params(&mut self.device, index, params)
    }

    pub fn material_params(&self, index: usize) -> Option<&[u8]> {
        self.materials.params(index)
    }

    /// Adds `mesh` under `transform` with material `material_index`; returns its top-level slot
    pub fn add_mesh(&mut self, mesh: &InterleavedMesh, material_index: usize, transform: &Matrix4x4) -> SceneResult<usize> {
        let material = self.materials.get(material_index)?.handle;
        let slot = self.graph.add_mesh(
            &mut self.device,
            &self.context.fixed,
            (material_index, material),
            mesh,
            transform,
        )?;
        self.controller.invalidate();
        Ok(slot)
    }

    /// Adds a volume over `bounds` sampled from `atlas`; returns its top-level slot.
    /// The scene's volume sampler is rebound to `atlas`.
    pub fn add_volume(
        &mut self,
        atlas: AtlasTexture,
        bounds: AABB,
        material_index: usize,
        transform: &Matrix4x4,
        intersect: VolumeIntersect,
    ) -> SceneResult<usize> {
        let material = self.materials.get(material_index)?.handle;
        self.sampler.bind(&mut self.device, atlas)?;
        let slot = self.graph.add_volume(
            &mut self.device,
            &self.context.fixed,
            (material_index, material),
            bounds,
            transform,
            intersect,
        )?;
        self.controller.invalidate();
        Ok(slot)
    }

    /// Destroys every subtree and material. Programs, the output surface and
    /// frame parameters survive.
    pub fn clear_graph(&mut self) -> SceneResult<()> {
        self.controller.invalidate();
        self.graph.clear(&mut self.device)?;
        self.materials.clear(&mut self.device)
    }

    pub fn set_camera(&mut self, camera: &CameraBasis) {
        self.frame.set_camera(camera);
    }

    pub fn set_sample(&mut self, frame_number: u32, sample: u32) {
        self.frame.set_sample(frame_number, sample);
    }

    pub fn set_light(&mut self, position: Vec3) {
        self.frame.set_light(position);
    }

    pub fn set_shading(&mut self, shading: ShadingMode) {
        self.frame.set_shading(shading);
    }

    pub fn set_volume_params(&mut self, steps: Vec3, extinction: Vec3, cutoff: Vec3) {
        self.frame.set_volume_params(steps, extinction, cutoff);
    }

    pub fn set_transfer_func(&mut self, table: &TransferFunction) {
        self.frame.set_transfer_func(table);
    }

    pub fn assign_volume_descriptor(&mut self, descriptor: &[u8]) -> SceneResult<()> {
        self.frame.assign_volume_descriptor(descriptor)
    }

    /// Pushes pending frame parameters now instead of at the next launch
    pub fn publish_frame(&mut self) -> SceneResult<()> {
        self.frame.publish(&mut self.device)
    }

    pub fn frame_params(&self) -> &FrameParams {
        self.frame.pending()
    }

    pub fn validate(&mut self) -> SceneResult<()> {
        self.controller.validate(&mut self.device)
    }

    /// Publishes pending frame parameters, then traces one frame into the
    /// output surface and waits for it
    pub fn launch(&mut self) -> SceneResult<()> {
        if self.controller.state() == GraphState::Ready && self.frame.is_dirty() {
            self.frame.publish(&mut self.device)?;
        }
        self.controller.launch(&mut self.device, &self.context.output)
    }

    pub fn state(&self) -> GraphState {
        self.controller.state()
    }

    /// Copies the last frame into the raster texture `texture`
    pub fn copy_to_external_texture(&mut self, texture: u32) -> SceneResult<()> {
        self.context
            .output
            .copy_to_texture(&self.device, &mut self.raster, texture)
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn output_surface(&self) -> &OutputSurface {
        &self.context.output
    }

    pub fn programs(&self) -> &FixedPrograms {
        &self.context.fixed
    }

    /// Distinct `(module, symbol)` programs created so far
    pub fn programs_loaded(&self) -> usize {
        self.context.programs.len()
    }

    pub fn transfer_buffer(&self) -> BufferHandle {
        self.frame.transfer_buffer()
    }

    pub fn seed_buffer(&self) -> BufferHandle {
        self.context.seeds
    }

    pub fn volume_sampler(&self) -> Option<(SamplerHandle, AtlasTexture)> {
        self.sampler.current()
    }

    pub fn launches(&self) -> u64 {
        self.controller.launches()
    }

    pub fn settings(&self) -> &SceneSettings {
        &self.context.settings
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn raster(&self) -> &R {
        &self.raster
    }

    /// Destroys every device object the scene created and returns the backends
    pub fn teardown(mut self) -> SceneResult<(D, R)> {
        info!("tearing down scene");
        self.graph.destroy(&mut self.device)?;
        self.materials.clear(&mut self.device)?;
        self.sampler.release(&mut self.device)?;
        self.frame.destroy(&mut self.device)?;
        self.context.destroy(&mut self.device, &mut self.raster)?;
        Ok((self.device, self.raster))
    }
}
