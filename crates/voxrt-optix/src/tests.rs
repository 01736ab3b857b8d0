use std::{fs, path::Path};

use tempfile::TempDir;
use voxrt::{
    camera::CameraBasis,
    geometry::{AABB, Matrix4x4, Vec3, Vec4},
    mesh::InterleavedMesh,
    transfer::TransferFunction,
};

use crate::{
    AtlasTexture, ErrorKind, GraphState, HostDevice, HostRaster, ObjectKind, Scene, SceneError, SceneSettings,
    VolumeIntersect, bindings,
    device::{BufferFormat, Device, Scope, Value},
    graph::SubtreeKind,
    interop::PixelFormat,
};

const MATERIAL_MODULE: &str = "optix_trace_surface";

fn write_module(dir: &Path, name: &str, entries: &[&str]) {
    let mut source = String::from(".version 6.0\n.target sm_50\n.address_size 64\n\n");
    for entry in entries {
        source.push_str(&format!(".visible .entry {entry}(\n)\n{{\n\tret;\n}}\n\n"));
    }
    fs::write(dir.join(name), source).unwrap();
}

pub(crate) fn program_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_module(dir.path(), "optix_trace_primary.ptx", &["trace_primary", "exception"]);
    write_module(dir.path(), "optix_trace_miss.ptx", &["miss"]);
    write_module(dir.path(), "optix_mesh_intersect.ptx", &["mesh_intersect", "mesh_bounds"]);
    write_module(
        dir.path(),
        "optix_vol_intersect.ptx",
        &["vol_intersect", "vol_levelset", "vol_deep", "vol_bounds"],
    );
    write_module(dir.path(), "optix_trace_surface.ptx", &["trace_surface", "trace_shadow"]);
    dir
}

fn scene(dir: &TempDir) -> Scene<HostDevice, HostRaster> {
    let settings = SceneSettings {
        seed: Some(1),
        ..Default::default()
    };
    Scene::initialize(HostDevice::new(dir.path()), HostRaster::new(), settings, 8, 6).unwrap()
}

fn scene_with_material(dir: &TempDir) -> Scene<HostDevice, HostRaster> {
    let mut scene = scene(dir);
    scene
        .add_material(MATERIAL_MODULE, "trace_surface", "trace_shadow")
        .unwrap();
    scene
}

fn unit_bounds() -> AABB {
    AABB::new(Vec3(-1.0, -1.0, -1.0), Vec3(1.0, 1.0, 1.0))
}

fn top_children(scene: &Scene<HostDevice, HostRaster>) -> Vec<Option<crate::device::TransformHandle>> {
    let (_, children) = scene.device().group(scene.graph().top()).unwrap();
    children.to_vec()
}

#[test]
fn initialized_scene_validates_empty() {
    let dir = program_dir();
    let mut scene = scene(&dir);
    let device = scene.device();

    assert_eq!(device.entry_point_count(), 1);
    assert_eq!(device.ray_type_count(), 2);
    assert_eq!(device.stack_size(), 4200);
    assert_eq!(
        device.variable(Scope::Context, bindings::SCENE_EPSILON),
        Some(&Value::Float(1.0e-6))
    );
    for name in [
        bindings::CAM_POS,
        bindings::CAM_U,
        bindings::CAM_V,
        bindings::CAM_W,
        bindings::FRAME_NUMBER,
        bindings::SAMPLE,
        bindings::LIGHT_POS,
        bindings::SCN_SHADING,
        bindings::SCN_EXTINCT,
        bindings::SCN_STEPS,
        bindings::SCN_CUTOFF,
        bindings::SCN_TRANSFER_FUNC,
        bindings::GVDB,
        bindings::RND_SEEDS,
        bindings::OUTPUT_BUFFER,
        bindings::TOP_OBJECT,
        bindings::BAD_COLOR,
    ] {
        assert!(device.variable(Scope::Context, name).is_some(), "`{name}` not declared");
    }
    assert_eq!(
        device.variable(Scope::Context, bindings::GVDB),
        Some(&Value::UserData(vec![0; 512]))
    );

    let (acceleration, children) = device.group(scene.graph().top()).unwrap();
    assert!(children.is_empty());
    assert_eq!(device.acceleration(acceleration).unwrap().0.builder, "NoAccel");

    let seeds = device.buffer_desc(scene.seed_buffer()).unwrap();
    assert_eq!((seeds.format, seeds.width, seeds.height), (BufferFormat::UnsignedInt, 8, 6));

    scene.validate().unwrap();
    assert_eq!(scene.state(), GraphState::Ready);
}

#[test]
fn fixed_programs_come_from_their_modules() {
    let dir = program_dir();
    let scene = scene(&dir);
    let device = scene.device();
    let programs = scene.programs();

    let (module, symbol) = device.program(device.ray_generation_program(0).unwrap()).unwrap();
    assert!(module.ends_with("optix_trace_primary.ptx"));
    assert_eq!(symbol, "trace_primary");
    assert_eq!(device.exception_program(0), Some(programs.exception));
    assert_eq!(device.miss_program(bindings::RADIANCE_RAY), Some(programs.miss));

    let (module, symbol) = device.program(programs.volume_bounds).unwrap();
    assert!(module.ends_with("optix_vol_intersect.ptx"));
    assert_eq!(symbol, "vol_bounds");
}

#[test]
fn missing_module_fails_initialization() {
    let dir = program_dir();
    fs::remove_file(dir.path().join("optix_mesh_intersect.ptx")).unwrap();

    let err = Scene::initialize(HostDevice::new(dir.path()), HostRaster::new(), SceneSettings::default(), 4, 4)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::ResourceCreation);
    assert!(err.to_string().contains("mesh_intersect"), "{err}");
}

#[test]
fn slots_follow_creation_order() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    let cube = InterleavedMesh::unit_cube();
    let identity = Matrix4x4::identity();

    let slots = [
        scene.add_mesh(&cube, 0, &identity).unwrap(),
        scene
            .add_volume(AtlasTexture(5), unit_bounds(), 0, &identity, VolumeIntersect::Surface)
            .unwrap(),
        scene
            .add_mesh(&cube, 0, &Matrix4x4::translation(Vec3(2.0, 0.0, 0.0)))
            .unwrap(),
    ];
    assert_eq!(slots, [0, 1, 2]);

    let children = top_children(&scene);
    assert_eq!(children.len(), 3);
    for (slot, subtree) in scene.graph().subtrees().iter().enumerate() {
        assert_eq!(children[slot], Some(subtree.transform));
    }
    assert_eq!(scene.graph().mesh_count(), 2);
    assert_eq!(scene.graph().volume_count(), 1);

    let (matrix, _) = scene.device().transform(scene.graph().subtrees()[2].transform).unwrap();
    assert_eq!(*matrix, Matrix4x4::translation(Vec3(2.0, 0.0, 0.0)));

    scene.validate().unwrap();
}

#[test]
fn clear_restarts_slot_numbering() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    let cube = InterleavedMesh::unit_cube();
    let identity = Matrix4x4::identity();
    scene.add_mesh(&cube, 0, &identity).unwrap();
    scene
        .add_volume(AtlasTexture(5), unit_bounds(), 0, &identity, VolumeIntersect::Deep)
        .unwrap();

    scene.clear_graph().unwrap();
    assert!(scene.graph().is_empty());
    assert!(scene.materials().is_empty());
    assert!(top_children(&scene).is_empty());
    let device = scene.device();
    for kind in [
        ObjectKind::Geometry,
        ObjectKind::Instance,
        ObjectKind::GeometryGroup,
        ObjectKind::Transform,
        ObjectKind::Material,
    ] {
        assert_eq!(device.live_count(kind), 0, "{kind} survived the clear");
    }
    let (_, dirty) = device.acceleration(scene.graph().top_acceleration()).unwrap();
    assert!(dirty);

    let material = scene
        .add_material(MATERIAL_MODULE, "trace_surface", "trace_shadow")
        .unwrap();
    assert_eq!(material, 0);
    assert_eq!(scene.add_mesh(&cube, material, &identity).unwrap(), 0);
    assert_eq!(top_children(&scene).len(), 1);

    scene.validate().unwrap();
}

#[test]
fn one_sampler_tracks_latest_atlas() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    let identity = Matrix4x4::identity();

    scene
        .add_volume(AtlasTexture(3), unit_bounds(), 0, &identity, VolumeIntersect::Surface)
        .unwrap();
    scene
        .add_volume(AtlasTexture(9), unit_bounds(), 0, &identity, VolumeIntersect::Surface)
        .unwrap();

    let samplers = scene.device().samplers();
    assert_eq!(samplers.len(), 1);
    let (sampler, atlas, _) = samplers[0];
    assert_eq!(atlas, 9);
    assert_eq!(scene.volume_sampler(), Some((sampler, AtlasTexture(9))));
    assert_eq!(
        scene.device().variable(Scope::Context, bindings::VOL_TEX_IN),
        Some(&Value::Sampler(sampler))
    );
}

#[test]
fn volume_flags_pick_intersection_program() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    let identity = Matrix4x4::identity();

    let cases = [
        ((true, false), "vol_deep"),
        ((false, true), "vol_levelset"),
        ((false, false), "vol_intersect"),
        ((true, true), "vol_deep"),
    ];
    for ((is_deep, is_level_set), expected) in cases {
        let intersect = VolumeIntersect::from_flags(is_deep, is_level_set);
        let slot = scene
            .add_volume(AtlasTexture(1), unit_bounds(), 0, &identity, intersect)
            .unwrap();

        let subtree = &scene.graph().subtrees()[slot];
        assert_eq!(subtree.kind, SubtreeKind::Volume(intersect));
        let geometry = scene.device().geometry(subtree.geometry).unwrap();
        let (_, symbol) = scene.device().program(geometry.intersection).unwrap();
        assert_eq!(symbol, expected);
    }
}

#[test]
fn volume_subtree_layout() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    scene
        .add_material(MATERIAL_MODULE, "trace_surface", "trace_shadow")
        .unwrap();

    let bounds = AABB::new(Vec3(0.0, 1.0, 2.0), Vec3(3.0, 4.0, 5.0));
    let slot = scene
        .add_volume(AtlasTexture(1), bounds, 1, &Matrix4x4::identity(), VolumeIntersect::LevelSet)
        .unwrap();
    let subtree = &scene.graph().subtrees()[slot];
    let device = scene.device();

    let geometry = device.geometry(subtree.geometry).unwrap();
    assert_eq!(geometry.primitive_count, 1);
    assert_eq!(geometry.bounding_box, scene.programs().volume_bounds);
    assert_eq!(
        device.variable(Scope::Geometry(subtree.geometry), bindings::MAT_ID),
        Some(&Value::Uint(1))
    );

    let Some(Value::Buffer(bricks)) = device.variable(Scope::Geometry(subtree.geometry), bindings::BRICK_BUFFER)
    else {
        panic!("brick buffer not bound");
    };
    let corners: Vec<f32> = device
        .read_buffer(*bricks)
        .unwrap()
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert_eq!(corners, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

    let (_, materials) = device.instance(subtree.instance).unwrap();
    assert_eq!(materials, [scene.materials().get(1).unwrap().handle]);

    let (desc, dirty) = device.acceleration(subtree.acceleration).unwrap();
    assert_eq!(desc.property("refit"), Some("1"));
    assert!(dirty);
}

#[test]
fn mesh_subtree_layout() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    let cube = InterleavedMesh::unit_cube();
    let slot = scene.add_mesh(&cube, 0, &Matrix4x4::identity()).unwrap();
    let subtree = &scene.graph().subtrees()[slot];
    let device = scene.device();
    let scope = Scope::Geometry(subtree.geometry);

    let geometry = device.geometry(subtree.geometry).unwrap();
    assert_eq!(geometry.primitive_count, cube.triangle_count());
    assert_eq!(geometry.intersection, scene.programs().mesh_intersect);

    let buffer = |name: &str| match device.variable(scope, name) {
        Some(Value::Buffer(b)) => *b,
        other => panic!("`{name}` bound to {other:?}"),
    };
    assert_eq!(buffer(bindings::TINDEX_BUFFER), buffer(bindings::NINDEX_BUFFER));
    assert_eq!(
        device.read_buffer(buffer(bindings::VINDEX_BUFFER)),
        device.read_buffer(buffer(bindings::NINDEX_BUFFER))
    );
    assert!(device.read_buffer(buffer(bindings::MINDEX_BUFFER)).unwrap().iter().all(|&b| b == 0));
    assert!(device.read_buffer(buffer(bindings::TEXCOORD_BUFFER)).unwrap().iter().all(|&b| b == 0));

    let texcoords = device.buffer_desc(buffer(bindings::TEXCOORD_BUFFER)).unwrap();
    assert_eq!((texcoords.format, texcoords.width), (BufferFormat::Float2, cube.vertex_count()));

    let (desc, _) = device.acceleration(subtree.acceleration).unwrap();
    assert_eq!((desc.builder.as_str(), desc.traverser.as_str()), ("Sbvh", "Bvh"));
    assert_eq!(desc.property("refit"), Some("0"));
    assert_eq!(desc.property("vertex_buffer_name"), Some("vertex_buffer"));
}

#[test]
fn bad_material_index_touches_nothing() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    let buffers = scene.device().live_count(ObjectKind::Buffer);

    let err = scene
        .add_mesh(&InterleavedMesh::unit_cube(), 4, &Matrix4x4::identity())
        .unwrap_err();
    assert!(matches!(err, SceneError::MaterialIndex { index: 4, count: 1 }));
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(scene.device().live_count(ObjectKind::Buffer), buffers);
    assert!(scene.graph().is_empty());
}

#[test]
fn failed_volume_keeps_scene_valid() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    let slot = scene
        .add_volume(AtlasTexture(3), unit_bounds(), 0, &Matrix4x4::identity(), VolumeIntersect::Surface)
        .unwrap();
    scene.validate().unwrap();
    let (sampler, atlas, _) = scene.device().samplers().remove(0);
    assert_eq!(atlas, 3);

    // raster texture 0 is never a valid atlas
    let err = scene
        .add_volume(AtlasTexture(0), unit_bounds(), 0, &Matrix4x4::identity(), VolumeIntersect::Deep)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceCreation);

    assert_eq!(scene.graph().len(), slot + 1);
    assert_eq!(top_children(&scene).len(), slot + 1);
    assert_eq!(scene.device().live_count(ObjectKind::Sampler), 1);
    assert_eq!(
        scene.device().variable(Scope::Context, bindings::VOL_TEX_IN),
        Some(&Value::Sampler(sampler))
    );
    scene.validate().unwrap();
}

#[test]
fn empty_mesh_is_rejected() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    let buffers = scene.device().live_count(ObjectKind::Buffer);
    let cube = InterleavedMesh::unit_cube();
    let empty = InterleavedMesh::new(Vec::new(), 0, cube.layout(), Vec::new()).unwrap();

    let err = scene.add_mesh(&empty, 0, &Matrix4x4::identity()).unwrap_err();
    assert!(matches!(err, SceneError::EmptyMesh));
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(scene.device().live_count(ObjectKind::Buffer), buffers);
    assert!(top_children(&scene).is_empty());
    scene.validate().unwrap();
}

#[test]
fn camera_publish_convention() {
    let dir = program_dir();
    let mut scene = scene(&dir);

    scene.set_camera(&CameraBasis::new(
        Vec3::zero(),
        Vec3(1.0, 0.0, 0.0),
        Vec3(0.0, 1.0, 0.0),
        Vec3(0.0, 0.0, 1.0),
        2.0,
    ));
    scene.publish_frame().unwrap();

    let variable = |name| scene.device().variable(Scope::Context, name).cloned();
    assert_eq!(variable(bindings::CAM_U), Some(Value::Float3([1.0, 0.0, 0.0])));
    assert_eq!(variable(bindings::CAM_V), Some(Value::Float3([0.0, -0.5, 0.0])));
    assert_eq!(variable(bindings::CAM_W), Some(Value::Float3([-0.0, -0.0, -1.0])));
}

#[test]
fn transfer_function_round_trip() {
    let dir = program_dir();
    let mut scene = scene(&dir);
    let table = TransferFunction::ramp(Vec4(0.0, 0.1, 0.2, 0.0), Vec4(1.0, 0.75, 0.5, 1.0));

    scene.set_transfer_func(&table);
    scene.validate().unwrap();
    scene.launch().unwrap();

    let stored = scene.device().read_buffer(scene.transfer_buffer()).unwrap();
    assert_eq!(stored, table.as_bytes());
    let desc = scene.device().buffer_desc(scene.transfer_buffer()).unwrap();
    assert_eq!((desc.format, desc.width), (BufferFormat::Float4, 16384));
}

#[test]
fn launch_requires_validation() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);

    let err = scene.launch().unwrap_err();
    assert!(matches!(err, SceneError::NotValidated));
    assert!(scene.device().launches().is_empty());

    scene.validate().unwrap();
    scene.set_sample(4, 2);
    scene.launch().unwrap();
    let launches = scene.device().launches();
    assert_eq!((launches[0].entry, launches[0].width, launches[0].height), (0, 8, 6));
    assert_eq!(scene.device().pending_launches(), 0);
    assert_eq!(
        scene.device().variable(Scope::Context, bindings::SAMPLE),
        Some(&Value::Uint(2))
    );

    // structural edits need a fresh validation
    scene
        .add_mesh(&InterleavedMesh::unit_cube(), 0, &Matrix4x4::identity())
        .unwrap();
    assert_eq!(scene.state(), GraphState::Unvalidated);
    assert!(matches!(scene.launch(), Err(SceneError::NotValidated)));

    scene.validate().unwrap();
    scene.launch().unwrap();
    assert_eq!(scene.launches(), 2);
    let (_, dirty) = scene.device().acceleration(scene.graph().top_acceleration()).unwrap();
    assert!(!dirty);
}

#[test]
fn copy_uploads_the_output_surface() {
    let dir = program_dir();
    let mut scene = scene(&dir);
    scene.validate().unwrap();
    scene.launch().unwrap();

    scene.copy_to_external_texture(21).unwrap();
    let upload = scene.raster().uploads()[0];
    assert_eq!(upload.texture, Some(21));
    assert_eq!(upload.source, Some(scene.output_surface().pixel_buffer()));
    assert_eq!(upload.alignment, 4);
    assert_eq!(upload.image.format, PixelFormat::Rgb);
    assert_eq!((upload.image.width, upload.image.height), (8, 6));
}

#[test]
fn teardown_releases_device_objects() {
    let dir = program_dir();
    let mut scene = scene_with_material(&dir);
    scene
        .add_mesh(&InterleavedMesh::unit_cube(), 0, &Matrix4x4::identity())
        .unwrap();
    scene
        .add_volume(AtlasTexture(2), unit_bounds(), 0, &Matrix4x4::identity(), VolumeIntersect::Deep)
        .unwrap();

    let (device, raster) = scene.teardown().unwrap();
    for kind in [
        ObjectKind::Buffer,
        ObjectKind::Geometry,
        ObjectKind::Material,
        ObjectKind::Instance,
        ObjectKind::Acceleration,
        ObjectKind::GeometryGroup,
        ObjectKind::Transform,
        ObjectKind::Group,
        ObjectKind::Sampler,
    ] {
        assert_eq!(device.live_count(kind), 0, "{kind} leaked");
    }
    assert_eq!(raster.live_pixel_buffers(), 0);
}

#[test]
fn material_params_use_configured_size() {
    let dir = program_dir();
    let settings = SceneSettings {
        material_params_size: 16,
        ..Default::default()
    };
    let mut scene = Scene::initialize(HostDevice::new(dir.path()), HostRaster::new(), settings, 2, 2).unwrap();
    let material = scene
        .add_material(MATERIAL_MODULE, "trace_surface", "trace_shadow")
        .unwrap();

    assert_eq!(scene.material_params(material), Some(&[0u8; 16][..]));
    scene.set_material_params(material, &[7; 16]).unwrap();
    assert_eq!(scene.material_params(material), Some(&[7u8; 16][..]));
    assert!(matches!(
        scene.set_material_params(material, &[7; 256]),
        Err(SceneError::BlobSize { expected: 16, actual: 256, .. })
    ));
}
