use super::vec3::Vec3;

/// Axis-aligned bounding box
/// Defined by 2 points
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct AABB {
    pub minimum: Vec3,
    pub maximum: Vec3
}

impl AABB {
    pub fn new(minimum: Vec3, maximum: Vec3) -> AABB {
        AABB { minimum, maximum }
    }

    /// Corner pair in the layout the device reads a brick from: min then max
    pub fn corners(&self) -> [Vec3; 2] {
        [self.minimum, self.maximum]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_min_then_max() {
        let b = AABB::new(Vec3(-1.0, -2.0, 0.0), Vec3(1.0, 4.0, 3.0));
        assert_eq!(b.corners(), [Vec3(-1.0, -2.0, 0.0), Vec3(1.0, 4.0, 3.0)]);
    }
}
