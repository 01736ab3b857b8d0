//! Per-frame parameters consumed by the device programs.
//!
//! Setters only edit the pending [`FrameParams`] block; [`FrameSink::publish`]
//! pushes the whole block to the context in one go, together with the
//! transfer function and volume descriptor if either changed since the last
//! publish.

use tracing::debug;
use voxrt::{
    camera::CameraBasis,
    geometry::Vec3,
    transfer::{TRANSFER_FUNC_LEN, TransferFunction},
};

use crate::{
    bindings,
    device::{
        BufferDesc, BufferFormat, BufferHandle, BufferKind, Device, DeviceError, Node, Scope, Value, fill_buffer,
    },
    error::{ResultExt, SceneError, SceneResult},
};

/// Shading model selector, interpreted by the device programs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ShadingMode(pub u32);

/// Ray-marching controls, one vector each
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeParams {
    pub steps: Vec3,
    pub extinction: Vec3,
    pub cutoff: Vec3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameParams {
    pub camera: CameraBasis,
    pub frame_number: u32,
    pub sample: u32,
    pub light_position: Vec3,
    pub shading: ShadingMode,
    pub volume: VolumeParams,
}

/// Camera vectors as published: `(cam_pos, cam_U, cam_V, cam_W)`.
/// V is negated and divided by the aspect ratio, W is negated.
pub fn published_camera(camera: &CameraBasis) -> [Vec3; 4] {
    [
        camera.position,
        camera.u,
        -camera.v / camera.aspect,
        -camera.w,
    ]
}

#[derive(Debug)]
pub struct FrameSink {
    pending: FrameParams,
    published: Option<FrameParams>,

    transfer_buffer: BufferHandle,
    pending_transfer: Option<Box<TransferFunction>>,

    descriptor: Vec<u8>,
    descriptor_dirty: bool,
}

impl FrameSink {
    /// Allocates the zero-filled transfer-function buffer and binds it as
    /// `scn_transfer_func`. Nothing else is published until [`FrameSink::publish`].
    pub fn create<D: Device + ?Sized>(device: &mut D, descriptor_size: usize) -> SceneResult<Self> {
        let desc = BufferDesc::linear(
            BufferKind::INPUT_OUTPUT | BufferKind::GPU_LOCAL,
            BufferFormat::Float4,
            TRANSFER_FUNC_LEN,
        );
        let transfer_buffer = device.create_buffer(desc).creating("transfer function buffer")?;
        fill_buffer(device, transfer_buffer, |bytes| {
            bytes.fill(0);
            Ok::<(), DeviceError>(())
        })
        .creating("transfer function buffer")?;
        device
            .set_variable(Scope::Context, bindings::SCN_TRANSFER_FUNC, Value::Buffer(transfer_buffer))
            .creating(format!("`{}` binding", bindings::SCN_TRANSFER_FUNC))?;

        Ok(Self {
            pending: FrameParams::default(),
            published: None,
            transfer_buffer,
            pending_transfer: None,
            descriptor: vec![0; descriptor_size],
            descriptor_dirty: true,
        })
    }

    pub fn pending(&self) -> &FrameParams {
        &self.pending
    }

    /// Block as of the last publish
    pub fn published(&self) -> Option<&FrameParams> {
        self.published.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.published.as_ref() != Some(&self.pending) || self.pending_transfer.is_some() || self.descriptor_dirty
    }

    pub fn transfer_buffer(&self) -> BufferHandle {
        self.transfer_buffer
    }

    pub fn descriptor(&self) -> &[u8] {
        &self.descriptor
    }

    pub fn set_camera(&mut self, camera: &CameraBasis) {
        self.pending.camera = *camera;
    }

    pub fn set_sample(&mut self, frame_number: u32, sample: u32) {
        self.pending.frame_number = frame_number;
        self.pending.sample = sample;
    }

    pub fn set_light(&mut self, position: Vec3) {
        self.pending.light_position = position;
    }

    pub fn set_shading(&mut self, shading: ShadingMode) {
        self.pending.shading = shading;
    }

    pub fn set_volume_params(&mut self, steps: Vec3, extinction: Vec3, cutoff: Vec3) {
        self.pending.volume = VolumeParams { steps, extinction, cutoff };
    }

    pub fn set_transfer_func(&mut self, table: &TransferFunction) {
        self.pending_transfer = Some(Box::new(table.clone()));
    }

    /// Replaces the serialized volume descriptor; its size is fixed at creation
    pub fn assign_volume_descriptor(&mut self, descriptor: &[u8]) -> SceneResult<()> {
        if descriptor.len() != self.descriptor.len() {
            return Err(SceneError::BlobSize {
                what: "volume descriptor",
                expected: self.descriptor.len(),
                actual: descriptor.len(),
            });
        }
        self.descriptor.copy_from_slice(descriptor);
        self.descriptor_dirty = true;
        Ok(())
    }

    pub fn publish<D: Device + ?Sized>(&mut self, device: &mut D) -> SceneResult<()> {
        let params = self.pending;
        let [position, u, v, w] = published_camera(&params.camera);
        let float3 = |vector: Vec3| Value::Float3(vector.into());

        let block = [
            (bindings::CAM_POS, float3(position)),
            (bindings::CAM_U, float3(u)),
            (bindings::CAM_V, float3(v)),
            (bindings::CAM_W, float3(w)),
            (bindings::FRAME_NUMBER, Value::Uint(params.frame_number)),
            (bindings::SAMPLE, Value::Uint(params.sample)),
            (bindings::LIGHT_POS, float3(params.light_position)),
            (bindings::SCN_SHADING, Value::Uint(params.shading.0)),
            (bindings::SCN_EXTINCT, float3(params.volume.extinction)),
            (bindings::SCN_STEPS, float3(params.volume.steps)),
            (bindings::SCN_CUTOFF, float3(params.volume.cutoff)),
        ];
        for (name, value) in block {
            device
                .set_variable(Scope::Context, name, value)
                .creating(format!("frame parameter `{name}`"))?;
        }

        if let Some(table) = self.pending_transfer.take() {
            fill_buffer(device, self.transfer_buffer, |bytes| {
                bytes.copy_from_slice(table.as_bytes());
                Ok::<(), DeviceError>(())
            })
            .creating("transfer function upload")?;
            debug!("transfer function uploaded");
        }

        if self.descriptor_dirty {
            device
                .set_variable(Scope::Context, bindings::GVDB, Value::UserData(self.descriptor.clone()))
                .creating("volume descriptor")?;
            self.descriptor_dirty = false;
        }

        self.published = Some(params);
        Ok(())
    }

    pub fn destroy<D: Device + ?Sized>(self, device: &mut D) -> SceneResult<()> {
        device
            .destroy(Node::Buffer(self.transfer_buffer))
            .creating("transfer function teardown")
    }
}
