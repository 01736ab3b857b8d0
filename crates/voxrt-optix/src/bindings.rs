//! Names shared with the device programs. These are a wire contract: the
//! generated device code looks programs and variables up by exactly these
//! strings.

// program entry symbols
pub const TRACE_PRIMARY: &str = "trace_primary";
pub const EXCEPTION: &str = "exception";
pub const MISS: &str = "miss";
pub const MESH_INTERSECT: &str = "mesh_intersect";
pub const MESH_BOUNDS: &str = "mesh_bounds";
pub const VOL_INTERSECT: &str = "vol_intersect";
pub const VOL_LEVELSET: &str = "vol_levelset";
pub const VOL_DEEP: &str = "vol_deep";
pub const VOL_BOUNDS: &str = "vol_bounds";

// context variables
pub const SCENE_EPSILON: &str = "scene_epsilon";
pub const OUTPUT_BUFFER: &str = "output_buffer";
pub const BAD_COLOR: &str = "bad_color";
pub const RND_SEEDS: &str = "rnd_seeds";
pub const TOP_OBJECT: &str = "top_object";
pub const CAM_POS: &str = "cam_pos";
pub const CAM_U: &str = "cam_U";
pub const CAM_V: &str = "cam_V";
pub const CAM_W: &str = "cam_W";
pub const FRAME_NUMBER: &str = "frame_number";
pub const SAMPLE: &str = "sample";
pub const LIGHT_POS: &str = "light_pos";
pub const SCN_SHADING: &str = "scn_shading";
pub const SCN_EXTINCT: &str = "scn_extinct";
pub const SCN_STEPS: &str = "scn_steps";
pub const SCN_CUTOFF: &str = "scn_cutoff";
pub const SCN_TRANSFER_FUNC: &str = "scn_transfer_func";
pub const GVDB: &str = "gvdb";
pub const VOL_TEX_IN: &str = "volTexIn";

// material variables
pub const MAT: &str = "mat";

// geometry variables
pub const MAT_ID: &str = "mat_id";
pub const VERTEX_BUFFER: &str = "vertex_buffer";
pub const NORMAL_BUFFER: &str = "normal_buffer";
pub const TEXCOORD_BUFFER: &str = "texcoord_buffer";
pub const VINDEX_BUFFER: &str = "vindex_buffer";
pub const NINDEX_BUFFER: &str = "nindex_buffer";
pub const TINDEX_BUFFER: &str = "tindex_buffer";
pub const MINDEX_BUFFER: &str = "mindex_buffer";
pub const BRICK_BUFFER: &str = "brick_buffer";

/// Ray types: index 0 carries radiance, index 1 answers shadow queries
pub const RADIANCE_RAY: u32 = 0;
pub const SHADOW_RAY: u32 = 1;
