use bytemuck::{Pod, Zeroable};

use super::Vec3;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Matrix4x4 {
    // row-major
    pub data: [[f32; 4]; 4],
}

impl Default for Matrix4x4 {
    fn default() -> Self {
        Matrix4x4::identity()
    }
}

impl Matrix4x4 {
    pub fn identity() -> Self {
        Matrix4x4 {
            data: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn translation(direction: Vec3) -> Matrix4x4 {
        let mut me = Self::identity();
        me.data[0][3] = direction.0;
        me.data[1][3] = direction.1;
        me.data[2][3] = direction.2;

        me
    }
}
