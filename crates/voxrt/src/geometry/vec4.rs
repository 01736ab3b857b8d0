use bytemuck::{Pod, Zeroable};

/// Four-component color / table entry, laid out like the device-side float4
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, PartialOrd, Pod, Zeroable)]
pub struct Vec4(pub f32, pub f32, pub f32, pub f32);

impl Vec4 {
    pub fn r(&self) -> f32 {
        self.0
    }

    pub fn g(&self) -> f32 {
        self.1
    }

    pub fn b(&self) -> f32 {
        self.2
    }

    pub fn a(&self) -> f32 {
        self.3
    }

    pub fn zero() -> Vec4 {
        Vec4(0.0, 0.0, 0.0, 0.0)
    }

    pub fn lerp(a: Vec4, b: Vec4, t: f32) -> Vec4 {
        let t = t.clamp(0.0, 1.0);
        Vec4(
            a.0 + (b.0 - a.0) * t,
            a.1 + (b.1 - a.1) * t,
            a.2 + (b.2 - a.2) * t,
            a.3 + (b.3 - a.3) * t,
        )
    }
}

impl From<[f32; 4]> for Vec4 {
    fn from(value: [f32; 4]) -> Self {
        Vec4(value[0], value[1], value[2], value[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_clamps_parameter() {
        let a = Vec4::zero();
        let b = Vec4(1.0, 2.0, 3.0, 4.0);
        assert_eq!(Vec4::lerp(a, b, 0.5), Vec4(0.5, 1.0, 1.5, 2.0));
        assert_eq!(Vec4::lerp(a, b, 2.0), b);
        assert_eq!(Vec4::lerp(a, b, -1.0), a);
    }
}
