use crate::geometry::Vec3;

/// Camera description as the device programs consume it: an eye position and
/// an un-normalized view basis plus the raster aspect ratio.
///
/// The basis is stored as the application computes it. Sign and scale
/// conventions of the device side are applied when the basis is published.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBasis {
    pub position: Vec3,
    pub u: Vec3,
    pub v: Vec3,
    pub w: Vec3,
    pub aspect: f32,
}

impl Default for CameraBasis {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            u: Vec3::zero(),
            v: Vec3::zero(),
            w: Vec3::zero(),
            // zero would turn the published V into NaNs
            aspect: 1.0,
        }
    }
}

impl CameraBasis {
    pub fn new(position: Vec3, u: Vec3, v: Vec3, w: Vec3, aspect: f32) -> Self {
        Self { position, u, v, w, aspect }
    }

    /// Orthonormal basis looking from `eye` at `target`; `w` points back toward the eye
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, aspect: f32) -> Self {
        let w = Vec3::normalized(eye - target);
        let u = Vec3::normalized(Vec3::cross(up, w));
        let v = Vec3::cross(w, u);

        Self { position: eye, u, v, w, aspect }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_builds_right_handed_basis() {
        let cam = CameraBasis::look_at(
            Vec3(0.0, 0.0, 5.0),
            Vec3::zero(),
            Vec3(0.0, 1.0, 0.0),
            1.5,
        );

        assert_eq!(cam.w, Vec3(0.0, 0.0, 1.0));
        assert_eq!(cam.u, Vec3(1.0, 0.0, 0.0));
        assert_eq!(cam.v, Vec3(0.0, 1.0, 0.0));
        assert_eq!(cam.aspect, 1.5);
    }
}
