//! The node-level API of a ray-tracing device.
//!
//! The scene layer never talks to a driver directly; it builds the hierarchy
//! through [`Device`], which mirrors the object model of node-graph ray-tracing
//! runtimes: programs, buffers, geometry, materials, geometry instances,
//! acceleration structures, geometry groups, transforms, groups, texture
//! samplers and typed variables attached to the context, a geometry or a
//! material. [`HostDevice`] is an in-memory implementation used for headless
//! runs and tests.

use std::{fmt, path::Path};

use bitflags::bitflags;
use thiserror::Error;
use voxrt::geometry::Matrix4x4;

use crate::macros::device_handles;

mod host;
mod ptx;

pub use host::{HostDevice, LaunchRecord, ObjectKind};

device_handles!(
    ProgramHandle,
    BufferHandle,
    GeometryHandle,
    MaterialHandle,
    InstanceHandle,
    AccelerationHandle,
    GeometryGroupHandle,
    TransformHandle,
    /// A group whose children are transforms; the top of the hierarchy
    GroupHandle,
    SamplerHandle,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    InvalidContext,
    InvalidValue,
    TypeMismatch,
    FileNotFound,
    InvalidSource,
    MemoryAllocationFailed,
    ValidationFailed,
    LaunchFailed,
    Unknown,
}

impl DeviceErrorCode {
    pub fn description(self) -> &'static str {
        match self {
            DeviceErrorCode::InvalidContext => "invalid context",
            DeviceErrorCode::InvalidValue => "invalid value",
            DeviceErrorCode::TypeMismatch => "type mismatch",
            DeviceErrorCode::FileNotFound => "file not found",
            DeviceErrorCode::InvalidSource => "invalid program source",
            DeviceErrorCode::MemoryAllocationFailed => "memory allocation failed",
            DeviceErrorCode::ValidationFailed => "validation failed",
            DeviceErrorCode::LaunchFailed => "launch failed",
            DeviceErrorCode::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Diagnostic reported by a device call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct DeviceError {
    pub code: DeviceErrorCode,
    pub message: String,
}

impl DeviceError {
    pub fn new(code: DeviceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferKind: u32 {
        const INPUT = 1 << 0;
        const OUTPUT = 1 << 1;
        const GPU_LOCAL = 1 << 2;

        const INPUT_OUTPUT = BufferKind::INPUT.bits() | BufferKind::OUTPUT.bits();
    }
}

/// Element format of a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    UnsignedByte4,
    UnsignedInt,
    Int3,
    Float,
    Float2,
    Float3,
    Float4,
}

impl BufferFormat {
    pub fn element_size(self) -> usize {
        match self {
            BufferFormat::UnsignedByte4 => 4,
            BufferFormat::UnsignedInt => 4,
            BufferFormat::Int3 => 12,
            BufferFormat::Float => 4,
            BufferFormat::Float2 => 8,
            BufferFormat::Float3 => 12,
            BufferFormat::Float4 => 16,
        }
    }
}

/// Shape of a buffer; 1D buffers have `height == 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub kind: BufferKind,
    pub format: BufferFormat,
    pub width: usize,
    pub height: usize,
}

impl BufferDesc {
    pub fn linear(kind: BufferKind, format: BufferFormat, len: usize) -> Self {
        Self { kind, format, width: len, height: 1 }
    }

    pub fn image(kind: BufferKind, format: BufferFormat, width: usize, height: usize) -> Self {
        Self { kind, format, width, height }
    }

    pub fn element_count(&self) -> usize {
        self.width * self.height
    }

    pub fn byte_size(&self) -> usize {
        self.element_count() * self.format.element_size()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryDesc {
    pub primitive_count: usize,
    pub intersection: ProgramHandle,
    pub bounding_box: ProgramHandle,
}

/// Builder/traverser pair plus free-form builder properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelerationDesc {
    pub builder: String,
    pub traverser: String,
    pub properties: Vec<(String, String)>,
}

impl AccelerationDesc {
    pub fn new(builder: &str, traverser: &str) -> Self {
        Self {
            builder: builder.to_string(),
            traverser: traverser.to_string(),
            properties: Vec::new(),
        }
    }

    /// Placeholder structure for a group that is rebuilt from its children every launch
    pub fn none() -> Self {
        Self::new("NoAccel", "NoAccel")
    }

    /// Spatial-split BVH over a single geometry instance
    pub fn sbvh(refit: bool) -> Self {
        Self::new("Sbvh", "Bvh")
            .with_property("refine", "0")
            .with_property("refit", if refit { "1" } else { "0" })
            .with_property("vertex_buffer_name", crate::bindings::VERTEX_BUFFER)
            .with_property("index_buffer_name", crate::bindings::VINDEX_BUFFER)
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.push((key.to_string(), value.to_string()));
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    Mirror,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    None,
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingMode {
    NormalizedCoordinates,
    ArrayIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    ElementType,
    NormalizedFloat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    Texture2D,
    Texture3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub target: TextureTarget,
    /// per axis
    pub wrap: [WrapMode; 3],
    /// minification, magnification, mipmapping
    pub filtering: [FilterMode; 3],
    pub indexing: IndexingMode,
    pub read: ReadMode,
}

impl SamplerDesc {
    /// Sampler over a brick atlas: clamped, bilinear within a slice, raw texels,
    /// addressed by texel index rather than normalized coordinates
    pub fn volume_atlas() -> Self {
        Self {
            target: TextureTarget::Texture3D,
            wrap: [WrapMode::ClampToEdge; 3],
            filtering: [FilterMode::Linear, FilterMode::Linear, FilterMode::None],
            indexing: IndexingMode::ArrayIndex,
            read: ReadMode::ElementType,
        }
    }
}

/// Where a variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Context,
    Geometry(GeometryHandle),
    Material(MaterialHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f32),
    Float3([f32; 3]),
    Uint(u32),
    Buffer(BufferHandle),
    Group(GroupHandle),
    Sampler(SamplerHandle),
    UserData(Vec<u8>),
}

/// Anything [`Device::destroy`] can release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Buffer(BufferHandle),
    Geometry(GeometryHandle),
    Material(MaterialHandle),
    Instance(InstanceHandle),
    Acceleration(AccelerationHandle),
    GeometryGroup(GeometryGroupHandle),
    Transform(TransformHandle),
    Group(GroupHandle),
    Sampler(SamplerHandle),
}

/// Node-graph ray-tracing runtime.
///
/// Calls are synchronous from the host's point of view except
/// [`Device::launch`], which only queues work; [`Device::synchronize`] blocks
/// until the device has drained it.
pub trait Device {
    fn set_entry_point_count(&mut self, count: u32) -> DeviceResult<()>;
    fn set_ray_type_count(&mut self, count: u32) -> DeviceResult<()>;
    fn set_stack_size(&mut self, bytes: usize) -> DeviceResult<()>;

    /// Compiles `symbol` out of the program module `module`
    fn create_program(&mut self, module: &Path, symbol: &str) -> DeviceResult<ProgramHandle>;
    fn set_ray_generation_program(&mut self, entry: u32, program: ProgramHandle) -> DeviceResult<()>;
    fn set_exception_program(&mut self, entry: u32, program: ProgramHandle) -> DeviceResult<()>;
    fn set_miss_program(&mut self, ray_type: u32, program: ProgramHandle) -> DeviceResult<()>;

    fn create_buffer(&mut self, desc: BufferDesc) -> DeviceResult<BufferHandle>;
    /// Wraps a raster-side pixel buffer object so the device writes straight into it
    fn create_buffer_from_gl(&mut self, desc: BufferDesc, gl_buffer: u32) -> DeviceResult<BufferHandle>;
    fn map_buffer(&mut self, buffer: BufferHandle) -> DeviceResult<&mut [u8]>;
    fn unmap_buffer(&mut self, buffer: BufferHandle) -> DeviceResult<()>;
    fn buffer_desc(&self, buffer: BufferHandle) -> DeviceResult<BufferDesc>;
    fn buffer_gl_id(&self, buffer: BufferHandle) -> DeviceResult<Option<u32>>;

    fn create_geometry(&mut self, desc: GeometryDesc) -> DeviceResult<GeometryHandle>;
    fn create_material(&mut self) -> DeviceResult<MaterialHandle>;
    fn set_closest_hit_program(&mut self, material: MaterialHandle, ray_type: u32, program: ProgramHandle) -> DeviceResult<()>;
    fn set_any_hit_program(&mut self, material: MaterialHandle, ray_type: u32, program: ProgramHandle) -> DeviceResult<()>;
    fn create_geometry_instance(&mut self, geometry: GeometryHandle, materials: &[MaterialHandle]) -> DeviceResult<InstanceHandle>;

    fn create_acceleration(&mut self, desc: &AccelerationDesc) -> DeviceResult<AccelerationHandle>;
    fn mark_dirty(&mut self, acceleration: AccelerationHandle) -> DeviceResult<()>;
    fn create_geometry_group(&mut self, acceleration: AccelerationHandle, children: &[InstanceHandle]) -> DeviceResult<GeometryGroupHandle>;
    /// `matrix` is row-major
    fn create_transform(&mut self, matrix: &Matrix4x4, child: GeometryGroupHandle) -> DeviceResult<TransformHandle>;
    fn create_group(&mut self, acceleration: AccelerationHandle) -> DeviceResult<GroupHandle>;
    fn set_child_count(&mut self, group: GroupHandle, count: usize) -> DeviceResult<()>;
    fn set_child(&mut self, group: GroupHandle, slot: usize, child: TransformHandle) -> DeviceResult<()>;

    fn create_texture_sampler_from_gl(&mut self, gl_texture: u32, desc: &SamplerDesc) -> DeviceResult<SamplerHandle>;

    fn set_variable(&mut self, scope: Scope, name: &str, value: Value) -> DeviceResult<()>;
    fn destroy(&mut self, node: Node) -> DeviceResult<()>;

    fn validate(&mut self) -> DeviceResult<()>;
    fn compile(&mut self) -> DeviceResult<()>;
    fn launch(&mut self, entry: u32, width: usize, height: usize) -> DeviceResult<()>;
    fn synchronize(&mut self) -> DeviceResult<()>;
}

/// Scoped buffer fill: map, let `fill` write every byte, unmap.
/// The buffer is unmapped even when `fill` fails.
pub fn fill_buffer<D, F, E>(device: &mut D, buffer: BufferHandle, fill: F) -> Result<(), E>
where
    D: Device + ?Sized,
    F: FnOnce(&mut [u8]) -> Result<(), E>,
    E: From<DeviceError>,
{
    let result = {
        let bytes = device.map_buffer(buffer)?;
        fill(bytes)
    };
    device.unmap_buffer(buffer)?;
    result
}

/// Creates a buffer and uploads `data` into it in one scoped mapping
pub fn upload_buffer<D, T>(device: &mut D, desc: BufferDesc, data: &[T]) -> DeviceResult<BufferHandle>
where
    D: Device + ?Sized,
    T: bytemuck::Pod,
{
    let bytes: &[u8] = bytemuck::cast_slice(data);
    if bytes.len() != desc.byte_size() {
        return Err(DeviceError::new(
            DeviceErrorCode::InvalidValue,
            format!("upload of {} bytes into a buffer of {}", bytes.len(), desc.byte_size()),
        ));
    }

    let buffer = device.create_buffer(desc)?;
    fill_buffer(device, buffer, |mapped| {
        mapped.copy_from_slice(bytes);
        Ok::<(), DeviceError>(())
    })?;

    Ok(buffer)
}
