//! In-memory device. Nothing is traced; instead every object, variable and
//! launch is recorded so the hierarchy can be validated and inspected on a
//! machine without a ray-tracing capable GPU.
//!
//! Program modules are plain PTX text files resolved against a search
//! directory, and a program only loads if its symbol is a `.entry` of that
//! module.

use std::{
    collections::{BTreeMap, HashMap},
    fmt, fs, io,
    mem::discriminant,
    path::{Path, PathBuf},
};

use tracing::{debug, trace};
use voxrt::geometry::Matrix4x4;

use super::{
    AccelerationDesc, AccelerationHandle, BufferDesc, BufferHandle, Device, DeviceError,
    DeviceErrorCode, DeviceResult, GeometryDesc, GeometryGroupHandle, GeometryHandle, GroupHandle,
    InstanceHandle, MaterialHandle, Node, ProgramHandle, SamplerDesc, SamplerHandle, Scope,
    TransformHandle, Value, ptx,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Program,
    Buffer,
    Geometry,
    Material,
    Instance,
    Acceleration,
    GeometryGroup,
    Transform,
    Group,
    Sampler,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Program => "program",
            ObjectKind::Buffer => "buffer",
            ObjectKind::Geometry => "geometry",
            ObjectKind::Material => "material",
            ObjectKind::Instance => "geometry instance",
            ObjectKind::Acceleration => "acceleration",
            ObjectKind::GeometryGroup => "geometry group",
            ObjectKind::Transform => "transform",
            ObjectKind::Group => "group",
            ObjectKind::Sampler => "texture sampler",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRecord {
    pub entry: u32,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug)]
struct HostBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
    mapped: bool,
    gl_buffer: Option<u32>,
}

#[derive(Debug)]
enum Object {
    Program {
        module: PathBuf,
        symbol: String,
    },
    Buffer(HostBuffer),
    Geometry {
        desc: GeometryDesc,
        variables: BTreeMap<String, Value>,
    },
    Material {
        closest_hit: BTreeMap<u32, ProgramHandle>,
        any_hit: BTreeMap<u32, ProgramHandle>,
        variables: BTreeMap<String, Value>,
    },
    Instance {
        geometry: GeometryHandle,
        materials: Vec<MaterialHandle>,
    },
    Acceleration {
        desc: AccelerationDesc,
        dirty: bool,
    },
    GeometryGroup {
        acceleration: AccelerationHandle,
        children: Vec<InstanceHandle>,
    },
    Transform {
        matrix: Matrix4x4,
        child: GeometryGroupHandle,
    },
    Group {
        acceleration: AccelerationHandle,
        children: Vec<Option<TransformHandle>>,
    },
    Sampler {
        gl_texture: u32,
        desc: SamplerDesc,
    },
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Object::Program { .. } => ObjectKind::Program,
            Object::Buffer(_) => ObjectKind::Buffer,
            Object::Geometry { .. } => ObjectKind::Geometry,
            Object::Material { .. } => ObjectKind::Material,
            Object::Instance { .. } => ObjectKind::Instance,
            Object::Acceleration { .. } => ObjectKind::Acceleration,
            Object::GeometryGroup { .. } => ObjectKind::GeometryGroup,
            Object::Transform { .. } => ObjectKind::Transform,
            Object::Group { .. } => ObjectKind::Group,
            Object::Sampler { .. } => ObjectKind::Sampler,
        }
    }
}

impl Node {
    fn id_and_kind(self) -> (u32, ObjectKind) {
        match self {
            Node::Buffer(h) => (h.raw(), ObjectKind::Buffer),
            Node::Geometry(h) => (h.raw(), ObjectKind::Geometry),
            Node::Material(h) => (h.raw(), ObjectKind::Material),
            Node::Instance(h) => (h.raw(), ObjectKind::Instance),
            Node::Acceleration(h) => (h.raw(), ObjectKind::Acceleration),
            Node::GeometryGroup(h) => (h.raw(), ObjectKind::GeometryGroup),
            Node::Transform(h) => (h.raw(), ObjectKind::Transform),
            Node::Group(h) => (h.raw(), ObjectKind::Group),
            Node::Sampler(h) => (h.raw(), ObjectKind::Sampler),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompileState {
    Dirty,
    Validated,
    Compiled,
}

fn invalid(message: impl Into<String>) -> DeviceError {
    DeviceError::new(DeviceErrorCode::InvalidValue, message)
}

fn mismatch(id: u32, found: ObjectKind, expected: ObjectKind) -> DeviceError {
    DeviceError::new(
        DeviceErrorCode::TypeMismatch,
        format!("object {id} is a {found}, expected a {expected}"),
    )
}

fn validation(message: impl Into<String>) -> DeviceError {
    DeviceError::new(DeviceErrorCode::ValidationFailed, message)
}

#[derive(Debug)]
pub struct HostDevice {
    search_path: PathBuf,
    modules: HashMap<PathBuf, Vec<String>>,

    next_id: u32,
    objects: BTreeMap<u32, Object>,

    entry_point_count: u32,
    ray_type_count: u32,
    stack_size: usize,
    ray_generation: BTreeMap<u32, ProgramHandle>,
    exception: BTreeMap<u32, ProgramHandle>,
    miss: BTreeMap<u32, ProgramHandle>,
    context_variables: BTreeMap<String, Value>,

    state: CompileState,
    launches: Vec<LaunchRecord>,
    in_flight: usize,
}

impl HostDevice {
    /// `search_path` is where relative program module names are resolved
    pub fn new(search_path: impl Into<PathBuf>) -> Self {
        Self {
            search_path: search_path.into(),
            modules: HashMap::new(),
            next_id: 1,
            objects: BTreeMap::new(),
            entry_point_count: 0,
            ray_type_count: 0,
            stack_size: 0,
            ray_generation: BTreeMap::new(),
            exception: BTreeMap::new(),
            miss: BTreeMap::new(),
            context_variables: BTreeMap::new(),
            state: CompileState::Dirty,
            launches: Vec::new(),
            in_flight: 0,
        }
    }

    fn insert(&mut self, object: Object) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        trace!("created {} {}", object.kind(), id);
        self.objects.insert(id, object);
        id
    }

    // structural edits need a fresh validate + compile
    fn touch(&mut self) {
        self.state = CompileState::Dirty;
    }

    fn object(&self, id: u32) -> DeviceResult<&Object> {
        self.objects
            .get(&id)
            .ok_or_else(|| invalid(format!("object {id} does not exist")))
    }

    fn object_mut(&mut self, id: u32) -> DeviceResult<&mut Object> {
        self.objects
            .get_mut(&id)
            .ok_or_else(|| invalid(format!("object {id} does not exist")))
    }

    fn check_kind(&self, id: u32, kind: ObjectKind) -> DeviceResult<()> {
        let found = self.object(id)?.kind();
        if found != kind {
            return Err(mismatch(id, found, kind));
        }
        Ok(())
    }

    fn is_live(&self, id: u32, kind: ObjectKind) -> bool {
        self.objects.get(&id).is_some_and(|o| o.kind() == kind)
    }

    fn buffer_mut(&mut self, buffer: BufferHandle) -> DeviceResult<&mut HostBuffer> {
        match self.object_mut(buffer.raw())? {
            Object::Buffer(b) => Ok(b),
            other => Err(mismatch(buffer.raw(), other.kind(), ObjectKind::Buffer)),
        }
    }

    fn buffer(&self, buffer: BufferHandle) -> DeviceResult<&HostBuffer> {
        match self.object(buffer.raw())? {
            Object::Buffer(b) => Ok(b),
            other => Err(mismatch(buffer.raw(), other.kind(), ObjectKind::Buffer)),
        }
    }

    fn module_entries(&mut self, path: &Path) -> DeviceResult<&[String]> {
        if !self.modules.contains_key(path) {
            let source = fs::read_to_string(path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => DeviceError::new(
                    DeviceErrorCode::FileNotFound,
                    format!("program module {} not found", path.display()),
                ),
                _ => DeviceError::new(
                    DeviceErrorCode::InvalidSource,
                    format!("unable to read {}: {e}", path.display()),
                ),
            })?;
            let entries = ptx::entry_points(&source);
            debug!("module {} exports {} entry points", path.display(), entries.len());
            self.modules.insert(path.to_path_buf(), entries);
        }

        Ok(self.modules.get(path).map(Vec::as_slice).unwrap_or_default())
    }

    fn check_value(&self, value: &Value) -> DeviceResult<()> {
        match value {
            Value::Buffer(b) => self.check_kind(b.raw(), ObjectKind::Buffer),
            Value::Group(g) => self.check_kind(g.raw(), ObjectKind::Group),
            Value::Sampler(s) => self.check_kind(s.raw(), ObjectKind::Sampler),
            _ => Ok(()),
        }
    }

    fn check_variables<'a>(
        &self,
        owner: &str,
        variables: impl IntoIterator<Item = (&'a String, &'a Value)>,
    ) -> DeviceResult<()> {
        for (name, value) in variables {
            let (id, kind) = match value {
                Value::Buffer(b) => (b.raw(), ObjectKind::Buffer),
                Value::Group(g) => (g.raw(), ObjectKind::Group),
                Value::Sampler(s) => (s.raw(), ObjectKind::Sampler),
                _ => continue,
            };
            if !self.is_live(id, kind) {
                return Err(validation(format!(
                    "variable `{name}` on {owner} references destroyed {kind} {id}"
                )));
            }
        }
        Ok(())
    }

    fn validate_objects(&self) -> DeviceResult<()> {
        for (&id, object) in &self.objects {
            match object {
                Object::Buffer(b) if b.mapped => {
                    return Err(validation(format!("buffer {id} is still mapped")));
                }
                Object::Geometry { desc, variables } => {
                    if desc.primitive_count == 0 {
                        return Err(validation(format!("geometry {id} has no primitives")));
                    }
                    if !self.is_live(desc.intersection.raw(), ObjectKind::Program)
                        || !self.is_live(desc.bounding_box.raw(), ObjectKind::Program)
                    {
                        return Err(validation(format!(
                            "geometry {id} is missing its intersection or bounding box program"
                        )));
                    }
                    self.check_variables(&format!("geometry {id}"), variables)?;
                }
                Object::Material { closest_hit, any_hit, variables } => {
                    if closest_hit.is_empty() && any_hit.is_empty() {
                        return Err(validation(format!("material {id} has no hit programs")));
                    }
                    self.check_variables(&format!("material {id}"), variables)?;
                }
                Object::Instance { geometry, materials } => {
                    if !self.is_live(geometry.raw(), ObjectKind::Geometry) {
                        return Err(validation(format!(
                            "geometry instance {id} references destroyed geometry {}",
                            geometry.raw()
                        )));
                    }
                    if materials.is_empty() {
                        return Err(validation(format!("geometry instance {id} has no material")));
                    }
                    if let Some(m) = materials.iter().find(|m| !self.is_live(m.raw(), ObjectKind::Material)) {
                        return Err(validation(format!(
                            "geometry instance {id} references destroyed material {}",
                            m.raw()
                        )));
                    }
                }
                Object::GeometryGroup { acceleration, children } => {
                    if !self.is_live(acceleration.raw(), ObjectKind::Acceleration) {
                        return Err(validation(format!("geometry group {id} has no acceleration")));
                    }
                    if children.is_empty() {
                        return Err(validation(format!("geometry group {id} is empty")));
                    }
                    if let Some(c) = children.iter().find(|c| !self.is_live(c.raw(), ObjectKind::Instance)) {
                        return Err(validation(format!(
                            "geometry group {id} references destroyed instance {}",
                            c.raw()
                        )));
                    }
                }
                Object::Transform { child, .. } => {
                    if !self.is_live(child.raw(), ObjectKind::GeometryGroup) {
                        return Err(validation(format!(
                            "transform {id} references destroyed geometry group {}",
                            child.raw()
                        )));
                    }
                }
                Object::Group { acceleration, children } => {
                    if !self.is_live(acceleration.raw(), ObjectKind::Acceleration) {
                        return Err(validation(format!("group {id} has no acceleration")));
                    }
                    for (slot, child) in children.iter().enumerate() {
                        match child {
                            None => {
                                return Err(validation(format!("group {id} child slot {slot} is unset")));
                            }
                            Some(t) if !self.is_live(t.raw(), ObjectKind::Transform) => {
                                return Err(validation(format!(
                                    "group {id} child slot {slot} references destroyed transform {}",
                                    t.raw()
                                )));
                            }
                            Some(_) => (),
                        }
                    }
                }
                _ => (),
            }
        }

        Ok(())
    }

    fn variables_mut(&mut self, scope: Scope) -> DeviceResult<&mut BTreeMap<String, Value>> {
        match scope {
            Scope::Context => Ok(&mut self.context_variables),
            Scope::Geometry(g) => match self.object_mut(g.raw())? {
                Object::Geometry { variables, .. } => Ok(variables),
                other => Err(mismatch(g.raw(), other.kind(), ObjectKind::Geometry)),
            },
            Scope::Material(m) => match self.object_mut(m.raw())? {
                Object::Material { variables, .. } => Ok(variables),
                other => Err(mismatch(m.raw(), other.kind(), ObjectKind::Material)),
            },
        }
    }

    fn set_material_program(
        &mut self,
        material: MaterialHandle,
        ray_type: u32,
        program: ProgramHandle,
        any_hit: bool,
    ) -> DeviceResult<()> {
        if ray_type >= self.ray_type_count {
            return Err(invalid(format!(
                "ray type {ray_type} out of range ({} declared)",
                self.ray_type_count
            )));
        }
        self.check_kind(program.raw(), ObjectKind::Program)?;
        self.check_kind(material.raw(), ObjectKind::Material)?;
        if let Object::Material { closest_hit, any_hit: any, .. } = self.object_mut(material.raw())? {
            let slot = if any_hit { any } else { closest_hit };
            slot.insert(ray_type, program);
        }
        self.touch();
        Ok(())
    }

    fn check_entry(&self, entry: u32) -> DeviceResult<()> {
        if entry >= self.entry_point_count {
            return Err(invalid(format!(
                "entry point {entry} out of range ({} declared)",
                self.entry_point_count
            )));
        }
        Ok(())
    }

    // inspection

    pub fn search_path(&self) -> &Path {
        &self.search_path
    }

    pub fn entry_point_count(&self) -> u32 {
        self.entry_point_count
    }

    pub fn ray_type_count(&self) -> u32 {
        self.ray_type_count
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn ray_generation_program(&self, entry: u32) -> Option<ProgramHandle> {
        self.ray_generation.get(&entry).copied()
    }

    pub fn exception_program(&self, entry: u32) -> Option<ProgramHandle> {
        self.exception.get(&entry).copied()
    }

    pub fn miss_program(&self, ray_type: u32) -> Option<ProgramHandle> {
        self.miss.get(&ray_type).copied()
    }

    /// Module path and entry symbol a program was created from
    pub fn program(&self, program: ProgramHandle) -> Option<(&Path, &str)> {
        match self.objects.get(&program.raw())? {
            Object::Program { module, symbol } => Some((module.as_path(), symbol.as_str())),
            _ => None,
        }
    }

    pub fn variable(&self, scope: Scope, name: &str) -> Option<&Value> {
        match scope {
            Scope::Context => self.context_variables.get(name),
            Scope::Geometry(g) => match self.objects.get(&g.raw())? {
                Object::Geometry { variables, .. } => variables.get(name),
                _ => None,
            },
            Scope::Material(m) => match self.objects.get(&m.raw())? {
                Object::Material { variables, .. } => variables.get(name),
                _ => None,
            },
        }
    }

    pub fn read_buffer(&self, buffer: BufferHandle) -> Option<&[u8]> {
        match self.objects.get(&buffer.raw())? {
            Object::Buffer(b) => Some(&b.data),
            _ => None,
        }
    }

    pub fn geometry(&self, geometry: GeometryHandle) -> Option<&GeometryDesc> {
        match self.objects.get(&geometry.raw())? {
            Object::Geometry { desc, .. } => Some(desc),
            _ => None,
        }
    }

    pub fn closest_hit_program(&self, material: MaterialHandle, ray_type: u32) -> Option<ProgramHandle> {
        match self.objects.get(&material.raw())? {
            Object::Material { closest_hit, .. } => closest_hit.get(&ray_type).copied(),
            _ => None,
        }
    }

    pub fn any_hit_program(&self, material: MaterialHandle, ray_type: u32) -> Option<ProgramHandle> {
        match self.objects.get(&material.raw())? {
            Object::Material { any_hit, .. } => any_hit.get(&ray_type).copied(),
            _ => None,
        }
    }

    pub fn instance(&self, instance: InstanceHandle) -> Option<(GeometryHandle, &[MaterialHandle])> {
        match self.objects.get(&instance.raw())? {
            Object::Instance { geometry, materials } => Some((*geometry, materials.as_slice())),
            _ => None,
        }
    }

    /// Descriptor and dirty flag of an acceleration structure
    pub fn acceleration(&self, acceleration: AccelerationHandle) -> Option<(&AccelerationDesc, bool)> {
        match self.objects.get(&acceleration.raw())? {
            Object::Acceleration { desc, dirty } => Some((desc, *dirty)),
            _ => None,
        }
    }

    pub fn geometry_group(&self, group: GeometryGroupHandle) -> Option<(AccelerationHandle, &[InstanceHandle])> {
        match self.objects.get(&group.raw())? {
            Object::GeometryGroup { acceleration, children } => Some((*acceleration, children.as_slice())),
            _ => None,
        }
    }

    pub fn transform(&self, transform: TransformHandle) -> Option<(&Matrix4x4, GeometryGroupHandle)> {
        match self.objects.get(&transform.raw())? {
            Object::Transform { matrix, child } => Some((matrix, *child)),
            _ => None,
        }
    }

    pub fn group(&self, group: GroupHandle) -> Option<(AccelerationHandle, &[Option<TransformHandle>])> {
        match self.objects.get(&group.raw())? {
            Object::Group { acceleration, children } => Some((*acceleration, children.as_slice())),
            _ => None,
        }
    }

    /// Every live texture sampler with the raster texture it wraps
    pub fn samplers(&self) -> Vec<(SamplerHandle, u32, SamplerDesc)> {
        self.objects
            .iter()
            .filter_map(|(&id, o)| match o {
                Object::Sampler { gl_texture, desc } => Some((SamplerHandle::from_raw(id), *gl_texture, *desc)),
                _ => None,
            })
            .collect()
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.objects.values().filter(|o| o.kind() == kind).count()
    }

    pub fn launches(&self) -> &[LaunchRecord] {
        &self.launches
    }

    pub fn pending_launches(&self) -> usize {
        self.in_flight
    }

    pub fn is_compiled(&self) -> bool {
        self.state == CompileState::Compiled
    }
}

impl Device for HostDevice {
    fn set_entry_point_count(&mut self, count: u32) -> DeviceResult<()> {
        self.entry_point_count = count;
        self.touch();
        Ok(())
    }

    fn set_ray_type_count(&mut self, count: u32) -> DeviceResult<()> {
        self.ray_type_count = count;
        self.touch();
        Ok(())
    }

    fn set_stack_size(&mut self, bytes: usize) -> DeviceResult<()> {
        self.stack_size = bytes;
        self.touch();
        Ok(())
    }

    fn create_program(&mut self, module: &Path, symbol: &str) -> DeviceResult<ProgramHandle> {
        let path = if module.is_absolute() {
            module.to_path_buf()
        } else {
            self.search_path.join(module)
        };

        if !self.module_entries(&path)?.iter().any(|e| e == symbol) {
            return Err(DeviceError::new(
                DeviceErrorCode::InvalidSource,
                format!("no entry point `{symbol}` in {}", path.display()),
            ));
        }

        let id = self.insert(Object::Program {
            module: path,
            symbol: symbol.to_string(),
        });
        Ok(ProgramHandle::from_raw(id))
    }

    fn set_ray_generation_program(&mut self, entry: u32, program: ProgramHandle) -> DeviceResult<()> {
        self.check_entry(entry)?;
        self.check_kind(program.raw(), ObjectKind::Program)?;
        self.ray_generation.insert(entry, program);
        self.touch();
        Ok(())
    }

    fn set_exception_program(&mut self, entry: u32, program: ProgramHandle) -> DeviceResult<()> {
        self.check_entry(entry)?;
        self.check_kind(program.raw(), ObjectKind::Program)?;
        self.exception.insert(entry, program);
        self.touch();
        Ok(())
    }

    fn set_miss_program(&mut self, ray_type: u32, program: ProgramHandle) -> DeviceResult<()> {
        if ray_type >= self.ray_type_count {
            return Err(invalid(format!(
                "ray type {ray_type} out of range ({} declared)",
                self.ray_type_count
            )));
        }
        self.check_kind(program.raw(), ObjectKind::Program)?;
        self.miss.insert(ray_type, program);
        self.touch();
        Ok(())
    }

    fn create_buffer(&mut self, desc: BufferDesc) -> DeviceResult<BufferHandle> {
        let id = self.insert(Object::Buffer(HostBuffer {
            desc,
            data: vec![0; desc.byte_size()],
            mapped: false,
            gl_buffer: None,
        }));
        Ok(BufferHandle::from_raw(id))
    }

    fn create_buffer_from_gl(&mut self, desc: BufferDesc, gl_buffer: u32) -> DeviceResult<BufferHandle> {
        if gl_buffer == 0 {
            return Err(invalid("raster buffer 0 is not a buffer object"));
        }
        let id = self.insert(Object::Buffer(HostBuffer {
            desc,
            data: vec![0; desc.byte_size()],
            mapped: false,
            gl_buffer: Some(gl_buffer),
        }));
        Ok(BufferHandle::from_raw(id))
    }

    fn map_buffer(&mut self, buffer: BufferHandle) -> DeviceResult<&mut [u8]> {
        let b = self.buffer_mut(buffer)?;
        if b.mapped {
            return Err(invalid(format!("buffer {} is already mapped", buffer.raw())));
        }
        b.mapped = true;
        Ok(&mut b.data)
    }

    fn unmap_buffer(&mut self, buffer: BufferHandle) -> DeviceResult<()> {
        let b = self.buffer_mut(buffer)?;
        if !b.mapped {
            return Err(invalid(format!("buffer {} is not mapped", buffer.raw())));
        }
        b.mapped = false;
        Ok(())
    }

    fn buffer_desc(&self, buffer: BufferHandle) -> DeviceResult<BufferDesc> {
        Ok(self.buffer(buffer)?.desc)
    }

    fn buffer_gl_id(&self, buffer: BufferHandle) -> DeviceResult<Option<u32>> {
        Ok(self.buffer(buffer)?.gl_buffer)
    }

    fn create_geometry(&mut self, desc: GeometryDesc) -> DeviceResult<GeometryHandle> {
        self.check_kind(desc.intersection.raw(), ObjectKind::Program)?;
        self.check_kind(desc.bounding_box.raw(), ObjectKind::Program)?;
        let id = self.insert(Object::Geometry {
            desc,
            variables: BTreeMap::new(),
        });
        Ok(GeometryHandle::from_raw(id))
    }

    fn create_material(&mut self) -> DeviceResult<MaterialHandle> {
        let id = self.insert(Object::Material {
            closest_hit: BTreeMap::new(),
            any_hit: BTreeMap::new(),
            variables: BTreeMap::new(),
        });
        Ok(MaterialHandle::from_raw(id))
    }

    fn set_closest_hit_program(&mut self, material: MaterialHandle, ray_type: u32, program: ProgramHandle) -> DeviceResult<()> {
        self.set_material_program(material, ray_type, program, false)
    }

    fn set_any_hit_program(&mut self, material: MaterialHandle, ray_type: u32, program: ProgramHandle) -> DeviceResult<()> {
        self.set_material_program(material, ray_type, program, true)
    }

    fn create_geometry_instance(&mut self, geometry: GeometryHandle, materials: &[MaterialHandle]) -> DeviceResult<InstanceHandle> {
        self.check_kind(geometry.raw(), ObjectKind::Geometry)?;
        for m in materials {
            self.check_kind(m.raw(), ObjectKind::Material)?;
        }
        let id = self.insert(Object::Instance {
            geometry,
            materials: materials.to_vec(),
        });
        Ok(InstanceHandle::from_raw(id))
    }

    fn create_acceleration(&mut self, desc: &AccelerationDesc) -> DeviceResult<AccelerationHandle> {
        let id = self.insert(Object::Acceleration {
            desc: desc.clone(),
            dirty: false,
        });
        Ok(AccelerationHandle::from_raw(id))
    }

    fn mark_dirty(&mut self, acceleration: AccelerationHandle) -> DeviceResult<()> {
        self.check_kind(acceleration.raw(), ObjectKind::Acceleration)?;
        if let Object::Acceleration { dirty, .. } = self.object_mut(acceleration.raw())? {
            *dirty = true;
        }
        Ok(())
    }

    fn create_geometry_group(&mut self, acceleration: AccelerationHandle, children: &[InstanceHandle]) -> DeviceResult<GeometryGroupHandle> {
        self.check_kind(acceleration.raw(), ObjectKind::Acceleration)?;
        for c in children {
            self.check_kind(c.raw(), ObjectKind::Instance)?;
        }
        let id = self.insert(Object::GeometryGroup {
            acceleration,
            children: children.to_vec(),
        });
        Ok(GeometryGroupHandle::from_raw(id))
    }

    fn create_transform(&mut self, matrix: &Matrix4x4, child: GeometryGroupHandle) -> DeviceResult<TransformHandle> {
        self.check_kind(child.raw(), ObjectKind::GeometryGroup)?;
        let id = self.insert(Object::Transform {
            matrix: *matrix,
            child,
        });
        Ok(TransformHandle::from_raw(id))
    }

    fn create_group(&mut self, acceleration: AccelerationHandle) -> DeviceResult<GroupHandle> {
        self.check_kind(acceleration.raw(), ObjectKind::Acceleration)?;
        let id = self.insert(Object::Group {
            acceleration,
            children: Vec::new(),
        });
        Ok(GroupHandle::from_raw(id))
    }

    fn set_child_count(&mut self, group: GroupHandle, count: usize) -> DeviceResult<()> {
        self.check_kind(group.raw(), ObjectKind::Group)?;
        if let Object::Group { children, .. } = self.object_mut(group.raw())? {
            children.resize(count, None);
        }
        self.touch();
        Ok(())
    }

    fn set_child(&mut self, group: GroupHandle, slot: usize, child: TransformHandle) -> DeviceResult<()> {
        self.check_kind(group.raw(), ObjectKind::Group)?;
        self.check_kind(child.raw(), ObjectKind::Transform)?;
        if let Object::Group { children, .. } = self.object_mut(group.raw())? {
            let count = children.len();
            let entry = children
                .get_mut(slot)
                .ok_or_else(|| invalid(format!("child slot {slot} out of range ({count} declared)")))?;
            *entry = Some(child);
        }
        self.touch();
        Ok(())
    }

    fn create_texture_sampler_from_gl(&mut self, gl_texture: u32, desc: &SamplerDesc) -> DeviceResult<SamplerHandle> {
        if gl_texture == 0 {
            return Err(invalid("raster texture 0 is not a texture object"));
        }
        let id = self.insert(Object::Sampler {
            gl_texture,
            desc: *desc,
        });
        Ok(SamplerHandle::from_raw(id))
    }

    fn set_variable(&mut self, scope: Scope, name: &str, value: Value) -> DeviceResult<()> {
        self.check_value(&value)?;

        let variables = self.variables_mut(scope)?;
        let declared = match variables.get(name) {
            Some(existing) if discriminant(existing) != discriminant(&value) => {
                return Err(DeviceError::new(
                    DeviceErrorCode::TypeMismatch,
                    format!("variable `{name}` was declared with a different type"),
                ));
            }
            Some(_) => false,
            None => true,
        };
        variables.insert(name.to_string(), value);

        if declared {
            self.touch();
        }
        Ok(())
    }

    fn destroy(&mut self, node: Node) -> DeviceResult<()> {
        let (id, kind) = node.id_and_kind();
        self.check_kind(id, kind)?;
        if let Some(Object::Buffer(b)) = self.objects.get(&id) {
            if b.mapped {
                return Err(invalid(format!("buffer {id} destroyed while mapped")));
            }
        }
        self.objects.remove(&id);
        trace!("destroyed {kind} {id}");
        self.touch();
        Ok(())
    }

    fn validate(&mut self) -> DeviceResult<()> {
        if self.entry_point_count == 0 {
            return Err(validation("no entry points declared"));
        }
        for entry in 0..self.entry_point_count {
            match self.ray_generation.get(&entry) {
                Some(p) if self.is_live(p.raw(), ObjectKind::Program) => (),
                _ => return Err(validation(format!("entry point {entry} has no ray generation program"))),
            }
        }

        match self.context_variables.get(crate::bindings::TOP_OBJECT) {
            Some(Value::Group(_)) => (),
            _ => {
                return Err(validation(format!(
                    "context variable `{}` is not bound to a group",
                    crate::bindings::TOP_OBJECT
                )));
            }
        }
        self.check_variables("the context", &self.context_variables)?;
        self.validate_objects()?;

        self.state = CompileState::Validated;
        Ok(())
    }

    fn compile(&mut self) -> DeviceResult<()> {
        if self.state == CompileState::Dirty {
            self.validate()?;
        }
        self.state = CompileState::Compiled;
        Ok(())
    }

    fn launch(&mut self, entry: u32, width: usize, height: usize) -> DeviceResult<()> {
        self.check_entry(entry)?;
        if self.state != CompileState::Compiled {
            self.compile()
                .map_err(|e| DeviceError::new(DeviceErrorCode::LaunchFailed, e.message))?;
        }
        if let Some(b) = self.objects.iter().find_map(|(id, o)| match o {
            Object::Buffer(b) if b.mapped => Some(*id),
            _ => None,
        }) {
            return Err(DeviceError::new(
                DeviceErrorCode::LaunchFailed,
                format!("buffer {b} is mapped during launch"),
            ));
        }

        // acceleration structures are (re)built as part of the launch
        for object in self.objects.values_mut() {
            if let Object::Acceleration { dirty, .. } = object {
                *dirty = false;
            }
        }

        self.launches.push(LaunchRecord { entry, width, height });
        self.in_flight += 1;
        Ok(())
    }

    fn synchronize(&mut self) -> DeviceResult<()> {
        self.in_flight = 0;
        Ok(())
    }
}
