//! Scene hierarchy builder.
//!
//! Every mesh or volume becomes one subtree
//!
//! ```text
//!   Transform
//!       |
//!   GeometryGroup -- Acceleration
//!       |
//!   GeometryInstance -- Material
//!       |
//!   Geometry -- intersection / bounds programs, buffers
//! ```
//!
//! whose transform is spliced into the top-level group at slot
//! `subtree count`. Subtrees live in an arena indexed by slot, so slot `i`
//! always holds the i-th subtree added since the last clear.

use tracing::{debug, info, warn};
use voxrt::{
    geometry::{AABB, Matrix4x4, Vec3},
    mesh::InterleavedMesh,
};

use crate::{
    bindings,
    device::{
        AccelerationDesc, AccelerationHandle, BufferDesc, BufferFormat, BufferHandle, BufferKind, Device,
        GeometryDesc, GeometryGroupHandle, GeometryHandle, GroupHandle, InstanceHandle, MaterialHandle, Node,
        ProgramHandle, Scope, TransformHandle, Value, upload_buffer,
    },
    error::{ResultExt, SceneError, SceneResult},
    programs::FixedPrograms,
};

/// Which volume intersection program a volume subtree uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeIntersect {
    /// first surface crossing
    Surface,
    /// zero crossing of a signed distance field
    LevelSet,
    /// accumulating march through the whole volume
    Deep,
}

impl VolumeIntersect {
    /// Deep marching wins over level sets when both are requested
    pub fn from_flags(is_deep: bool, is_level_set: bool) -> Self {
        match (is_deep, is_level_set) {
            (true, _) => VolumeIntersect::Deep,
            (false, true) => VolumeIntersect::LevelSet,
            (false, false) => VolumeIntersect::Surface,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            VolumeIntersect::Surface => bindings::VOL_INTERSECT,
            VolumeIntersect::LevelSet => bindings::VOL_LEVELSET,
            VolumeIntersect::Deep => bindings::VOL_DEEP,
        }
    }

    fn program(self, programs: &FixedPrograms) -> ProgramHandle {
        match self {
            VolumeIntersect::Surface => programs.volume_surface,
            VolumeIntersect::LevelSet => programs.volume_level_set,
            VolumeIntersect::Deep => programs.volume_deep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtreeKind {
    Mesh,
    Volume(VolumeIntersect),
}

/// Device nodes of one primitive subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtree {
    pub kind: SubtreeKind,
    pub material_index: usize,
    pub geometry: GeometryHandle,
    pub instance: InstanceHandle,
    pub acceleration: AccelerationHandle,
    pub geometry_group: GeometryGroupHandle,
    pub transform: TransformHandle,
    buffers: Vec<BufferHandle>,
}

impl Subtree {
    pub fn buffers(&self) -> &[BufferHandle] {
        &self.buffers
    }

    fn destroy<D: Device + ?Sized>(self, device: &mut D) -> SceneResult<()> {
        let nodes = [
            Node::Geometry(self.geometry),
            Node::Instance(self.instance),
            Node::GeometryGroup(self.geometry_group),
            Node::Transform(self.transform),
            Node::Acceleration(self.acceleration),
        ];
        for node in nodes.into_iter().chain(self.buffers.into_iter().map(Node::Buffer)) {
            device.destroy(node).creating("subtree teardown")?;
        }
        Ok(())
    }
}

/// Geometry parts of a subtree before it is wrapped and attached
struct Leaf {
    kind: SubtreeKind,
    geometry: GeometryHandle,
    buffers: Vec<BufferHandle>,
    refit: bool,
}

/// Nodes created for a subtree that is not attached yet
#[derive(Debug, Default)]
struct Staged {
    nodes: Vec<Node>,
}

impl Staged {
    fn track<T: Copy>(&mut self, handle: T, node: fn(T) -> Node) -> T {
        self.nodes.push(node(handle));
        handle
    }

    /// Destroys everything tracked, newest first
    fn release<D: Device + ?Sized>(self, device: &mut D) {
        for node in self.nodes.into_iter().rev() {
            if let Err(e) = device.destroy(node) {
                warn!("failed to release {node:?} of an unattached subtree: {e}");
            }
        }
    }
}

fn material_id(index: usize) -> SceneResult<u32> {
    u32::try_from(index).map_err(|_| SceneError::MaterialId(index))
}

#[derive(Debug)]
pub struct SceneGraph {
    top: GroupHandle,
    top_acceleration: AccelerationHandle,
    subtrees: Vec<Subtree>,
}

impl SceneGraph {
    /// Creates the empty top-level group and binds it as `top_object`
    pub fn create<D: Device + ?Sized>(device: &mut D) -> SceneResult<Self> {
        let top_acceleration = device
            .create_acceleration(&AccelerationDesc::none())
            .creating("top-level acceleration")?;
        let top = device.create_group(top_acceleration).creating("top-level group")?;
        device.set_child_count(top, 0).creating("top-level group")?;
        device
            .set_variable(Scope::Context, bindings::TOP_OBJECT, Value::Group(top))
            .creating(format!("`{}` binding", bindings::TOP_OBJECT))?;

        Ok(Self {
            top,
            top_acceleration,
            subtrees: Vec::new(),
        })
    }

    pub fn top(&self) -> GroupHandle {
        self.top
    }

    pub fn top_acceleration(&self) -> AccelerationHandle {
        self.top_acceleration
    }

    /// Subtrees in slot order
    pub fn subtrees(&self) -> &[Subtree] {
        &self.subtrees
    }

    pub fn len(&self) -> usize {
        self.subtrees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtrees.is_empty()
    }

    pub fn mesh_count(&self) -> usize {
        self.subtrees.iter().filter(|s| s.kind == SubtreeKind::Mesh).count()
    }

    pub fn volume_count(&self) -> usize {
        self.subtrees.len() - self.mesh_count()
    }

    /// Builds a triangle mesh subtree; returns its slot. A mesh without
    /// triangles is rejected before the device is touched.
    pub fn add_mesh<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        programs: &FixedPrograms,
        material: (usize, MaterialHandle),
        mesh: &InterleavedMesh,
        transform: &Matrix4x4,
    ) -> SceneResult<usize> {
        if mesh.triangle_count() == 0 {
            return Err(SceneError::EmptyMesh);
        }

        let mut staged = Staged::default();
        let built = self
            .build_mesh(device, programs, mesh, &mut staged)
            .and_then(|leaf| self.attach(device, leaf, material, transform, &mut staged));
        self.settle(device, staged, built)
    }

    fn build_mesh<D: Device + ?Sized>(
        &self,
        device: &mut D,
        programs: &FixedPrograms,
        mesh: &InterleavedMesh,
        staged: &mut Staged,
    ) -> SceneResult<Leaf> {
        let slot = self.subtrees.len();
        let vertices = mesh.vertex_count();
        let triangles = mesh.triangle_count();
        debug!("mesh subtree {slot}: {vertices} vertices, {triangles} triangles");
        if !mesh.has_texcoords() {
            warn!("mesh subtree {slot} has no texcoords, zero-filling");
        }

        let input = |format, len| BufferDesc::linear(BufferKind::INPUT, format, len);

        let positions: Vec<Vec3> = mesh.positions().collect();
        let normals: Vec<Vec3> = mesh.normals().collect();
        let texcoords: Vec<_> = mesh.texcoords().collect();
        let indices: Vec<_> = mesh.triangles().collect();
        // per-triangle material selects within the instance's own material list
        let material_ids = vec![0u32; triangles];

        let mut keep = |buffer: BufferHandle| staged.track(buffer, Node::Buffer);
        let vertex_buffer = keep(
            upload_buffer(device, input(BufferFormat::Float3, vertices), &positions).creating("mesh vertex buffer")?,
        );
        let normal_buffer = keep(
            upload_buffer(device, input(BufferFormat::Float3, vertices), &normals).creating("mesh normal buffer")?,
        );
        let texcoord_buffer = keep(
            upload_buffer(device, input(BufferFormat::Float2, vertices), &texcoords).creating("mesh texcoord buffer")?,
        );
        let vindex_buffer = keep(
            upload_buffer(device, input(BufferFormat::Int3, triangles), &indices).creating("mesh vertex index buffer")?,
        );
        let nindex_buffer = keep(
            upload_buffer(device, input(BufferFormat::Int3, triangles), &indices).creating("mesh normal index buffer")?,
        );
        let mindex_buffer = keep(
            upload_buffer(device, input(BufferFormat::UnsignedInt, triangles), &material_ids)
                .creating("mesh material index buffer")?,
        );

        let geometry = device
            .create_geometry(GeometryDesc {
                primitive_count: triangles,
                intersection: programs.mesh_intersect,
                bounding_box: programs.mesh_bounds,
            })
            .creating("mesh geometry")?;
        staged.track(geometry, Node::Geometry);

        let variables = [
            (bindings::VERTEX_BUFFER, vertex_buffer),
            (bindings::NORMAL_BUFFER, normal_buffer),
            (bindings::TEXCOORD_BUFFER, texcoord_buffer),
            (bindings::VINDEX_BUFFER, vindex_buffer),
            (bindings::NINDEX_BUFFER, nindex_buffer),
            // texcoords are indexed like normals
            (bindings::TINDEX_BUFFER, nindex_buffer),
            (bindings::MINDEX_BUFFER, mindex_buffer),
        ];
        for (name, buffer) in variables {
            device
                .set_variable(Scope::Geometry(geometry), name, Value::Buffer(buffer))
                .creating(format!("mesh geometry `{name}`"))?;
        }

        Ok(Leaf {
            kind: SubtreeKind::Mesh,
            geometry,
            buffers: vec![
                vertex_buffer,
                normal_buffer,
                texcoord_buffer,
                vindex_buffer,
                nindex_buffer,
                mindex_buffer,
            ],
            refit: false,
        })
    }

    /// Builds a single-brick volume subtree over `bounds`; returns its slot
    pub fn add_volume<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        programs: &FixedPrograms,
        material: (usize, MaterialHandle),
        bounds: AABB,
        transform: &Matrix4x4,
        intersect: VolumeIntersect,
    ) -> SceneResult<usize> {
        let mat_id = material_id(material.0)?;

        let mut staged = Staged::default();
        let built = self
            .build_volume(device, programs, mat_id, bounds, intersect, &mut staged)
            .and_then(|leaf| self.attach(device, leaf, material, transform, &mut staged));
        self.settle(device, staged, built)
    }

    fn build_volume<D: Device + ?Sized>(
        &self,
        device: &mut D,
        programs: &FixedPrograms,
        mat_id: u32,
        bounds: AABB,
        intersect: VolumeIntersect,
        staged: &mut Staged,
    ) -> SceneResult<Leaf> {
        let slot = self.subtrees.len();
        debug!("volume subtree {slot}: {:?} using `{}`", bounds, intersect.symbol());

        let brick_buffer = upload_buffer(
            device,
            BufferDesc::linear(BufferKind::INPUT, BufferFormat::Float3, 2),
            &bounds.corners()[..],
        )
        .creating("volume brick buffer")?;
        staged.track(brick_buffer, Node::Buffer);

        let geometry = device
            .create_geometry(GeometryDesc {
                primitive_count: 1,
                intersection: intersect.program(programs),
                bounding_box: programs.volume_bounds,
            })
            .creating("volume geometry")?;
        staged.track(geometry, Node::Geometry);
        device
            .set_variable(Scope::Geometry(geometry), bindings::BRICK_BUFFER, Value::Buffer(brick_buffer))
            .creating(format!("volume geometry `{}`", bindings::BRICK_BUFFER))?;
        device
            .set_variable(Scope::Geometry(geometry), bindings::MAT_ID, Value::Uint(mat_id))
            .creating(format!("volume geometry `{}`", bindings::MAT_ID))?;

        Ok(Leaf {
            kind: SubtreeKind::Volume(intersect),
            geometry,
            buffers: vec![brick_buffer],
            refit: true,
        })
    }

    fn attach<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        leaf: Leaf,
        (material_index, material): (usize, MaterialHandle),
        transform: &Matrix4x4,
        staged: &mut Staged,
    ) -> SceneResult<usize> {
        let instance = device
            .create_geometry_instance(leaf.geometry, &[material])
            .creating("geometry instance")?;
        staged.track(instance, Node::Instance);

        let acceleration = device
            .create_acceleration(&AccelerationDesc::sbvh(leaf.refit))
            .creating("subtree acceleration")?;
        staged.track(acceleration, Node::Acceleration);
        device.mark_dirty(acceleration).creating("subtree acceleration")?;

        let geometry_group = device
            .create_geometry_group(acceleration, &[instance])
            .creating("geometry group")?;
        staged.track(geometry_group, Node::GeometryGroup);
        let transform = device
            .create_transform(transform, geometry_group)
            .creating("transform")?;
        staged.track(transform, Node::Transform);

        let slot = self.subtrees.len();
        device.set_child_count(self.top, slot + 1).creating("top-level slot")?;
        device.set_child(self.top, slot, transform).creating("top-level slot")?;
        device
            .mark_dirty(self.top_acceleration)
            .creating("top-level acceleration")?;

        self.subtrees.push(Subtree {
            kind: leaf.kind,
            material_index,
            geometry: leaf.geometry,
            instance,
            acceleration,
            geometry_group,
            transform,
            buffers: leaf.buffers,
        });
        Ok(slot)
    }

    /// On failure, destroys whatever the partial subtree created and shrinks
    /// the top-level group back to the attached subtrees
    fn settle<D: Device + ?Sized>(&mut self, device: &mut D, staged: Staged, built: SceneResult<usize>) -> SceneResult<usize> {
        if built.is_err() {
            staged.release(device);
            if let Err(e) = device.set_child_count(self.top, self.subtrees.len()) {
                warn!("failed to restore top-level child count: {e}");
            }
        }
        built
    }

    /// Destroys every subtree and empties the top-level group. Slot
    /// numbering restarts at 0.
    pub fn clear<D: Device + ?Sized>(&mut self, device: &mut D) -> SceneResult<()> {
        let count = self.subtrees.len();
        for subtree in self.subtrees.drain(..) {
            subtree.destroy(device)?;
        }
        device.set_child_count(self.top, 0).creating("top-level slot")?;
        device
            .mark_dirty(self.top_acceleration)
            .creating("top-level acceleration")?;

        info!("cleared {count} subtrees");
        Ok(())
    }

    pub fn destroy<D: Device + ?Sized>(mut self, device: &mut D) -> SceneResult<()> {
        self.clear(device)?;
        device
            .destroy(Node::Group(self.top))
            .creating("top-level group teardown")?;
        device
            .destroy(Node::Acceleration(self.top_acceleration))
            .creating("top-level acceleration teardown")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ErrorKind, HostDevice, ObjectKind,
        programs::ProgramRegistry,
        settings::ProgramModules,
        tests::program_dir,
    };

    const SUBTREE_KINDS: [ObjectKind; 6] = [
        ObjectKind::Buffer,
        ObjectKind::Geometry,
        ObjectKind::Instance,
        ObjectKind::Acceleration,
        ObjectKind::GeometryGroup,
        ObjectKind::Transform,
    ];

    fn live(device: &HostDevice) -> Vec<usize> {
        SUBTREE_KINDS.iter().map(|&kind| device.live_count(kind)).collect()
    }

    fn graph(device: &mut HostDevice) -> (SceneGraph, FixedPrograms, MaterialHandle) {
        let mut registry = ProgramRegistry::new();
        let programs = FixedPrograms::load(&mut registry, device, &ProgramModules::default()).unwrap();
        let graph = SceneGraph::create(device).unwrap();
        let material = device.create_material().unwrap();
        (graph, programs, material)
    }

    #[test]
    fn failed_attach_releases_the_partial_subtree() {
        let dir = program_dir();
        let mut device = HostDevice::new(dir.path());
        let (mut graph, programs, material) = graph(&mut device);
        let cube = InterleavedMesh::unit_cube();
        graph
            .add_mesh(&mut device, &programs, (0, material), &cube, &Matrix4x4::identity())
            .unwrap();

        // the top-level dirty mark is the last step before the subtree is recorded
        device
            .destroy(Node::Acceleration(graph.top_acceleration()))
            .unwrap();
        let before = live(&device);

        let err = graph
            .add_mesh(&mut device, &programs, (0, material), &cube, &Matrix4x4::identity())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);
        assert_eq!(live(&device), before);
        assert_eq!(graph.len(), 1);
        let (_, children) = device.group(graph.top()).unwrap();
        assert_eq!(children.len(), 1);
        assert!(children[0].is_some());

        let err = graph
            .add_volume(
                &mut device,
                &programs,
                (0, material),
                AABB::new(Vec3(-1.0, -1.0, -1.0), Vec3(1.0, 1.0, 1.0)),
                &Matrix4x4::identity(),
                VolumeIntersect::Surface,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);
        assert_eq!(live(&device), before);
        assert_eq!(device.group(graph.top()).unwrap().1.len(), 1);
    }

    #[test]
    fn empty_mesh_touches_nothing() {
        let dir = program_dir();
        let mut device = HostDevice::new(dir.path());
        let (mut graph, programs, material) = graph(&mut device);
        let before = live(&device);
        let cube = InterleavedMesh::unit_cube();
        let empty = InterleavedMesh::new(Vec::new(), 0, cube.layout(), Vec::new()).unwrap();

        let err = graph
            .add_mesh(&mut device, &programs, (0, material), &empty, &Matrix4x4::identity())
            .unwrap_err();
        assert!(matches!(err, SceneError::EmptyMesh));
        assert_eq!(live(&device), before);
        assert!(graph.is_empty());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_material_index_is_rejected() {
        let dir = program_dir();
        let mut device = HostDevice::new(dir.path());
        let (mut graph, programs, material) = graph(&mut device);
        let before = live(&device);
        let index = u32::MAX as usize + 1;

        let err = graph
            .add_volume(
                &mut device,
                &programs,
                (index, material),
                AABB::new(Vec3::zero(), Vec3(1.0, 1.0, 1.0)),
                &Matrix4x4::identity(),
                VolumeIntersect::Deep,
            )
            .unwrap_err();
        assert!(matches!(err, SceneError::MaterialId(i) if i == index));
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(live(&device), before);
        assert!(graph.is_empty());
        assert_eq!(material_id(7).unwrap(), 7);
    }

    #[test]
    fn deep_takes_precedence() {
        use VolumeIntersect::*;

        assert_eq!(VolumeIntersect::from_flags(true, false), Deep);
        assert_eq!(VolumeIntersect::from_flags(false, true), LevelSet);
        assert_eq!(VolumeIntersect::from_flags(false, false), Surface);
        assert_eq!(VolumeIntersect::from_flags(true, true), Deep);
    }

    #[test]
    fn intersect_symbols() {
        assert_eq!(VolumeIntersect::Surface.symbol(), "vol_intersect");
        assert_eq!(VolumeIntersect::LevelSet.symbol(), "vol_levelset");
        assert_eq!(VolumeIntersect::Deep.symbol(), "vol_deep");
    }
}
