use bevy::{math::Vec3Swizzles, prelude::*};

/// Midpoint of an interval.
///
/// Every footprint split in the crate goes through this function. Box
/// quartering and edge splitting must agree bit for bit on shared
/// coordinates, otherwise seam vertices drift apart and leave cracks.
#[inline]
pub fn mid(a: f32, b: f32) -> f32 {
    0.5 * (a + b)
}

/// Distance from `value` to the interval `[min, max]`, zero inside.
#[inline]
pub fn axis_distance(value: f32, min: f32, max: f32) -> f32 {
    if value < min {
        min - value
    } else if value > max {
        value - max
    } else {
        0.0
    }
}

/// An axis-aligned box in terrain-local space.
///
/// The quadtrees subdivide the horizontal (x/z) footprint; the vertical
/// extent holds the configured height range at the root and is refined by the
/// per-node min/max heights during traversal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainAabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl TerrainAabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        debug_assert!(min.cmple(max).all(), "inverted aabb: {min} > {max}");
        Self { min, max }
    }

    /// The quarter footprint of child `index`, where `index % 2` selects the
    /// east half and `index / 2` the south half. The vertical extent is
    /// inherited unchanged.
    pub fn child(self, index: usize) -> Self {
        let mid_x = mid(self.min.x, self.max.x);
        let mid_z = mid(self.min.z, self.max.z);

        let (min_x, max_x) = if index % 2 == 0 {
            (self.min.x, mid_x)
        } else {
            (mid_x, self.max.x)
        };
        let (min_z, max_z) = if index / 2 == 0 {
            (self.min.z, mid_z)
        } else {
            (mid_z, self.max.z)
        };

        Self {
            min: Vec3::new(min_x, self.min.y, min_z),
            max: Vec3::new(max_x, self.max.y, max_z),
        }
    }

    /// The horizontal corners in loop order: north west, north east,
    /// south east, south west (north is -z, west is -x).
    pub fn corners_xz(self) -> [Vec2; 4] {
        [
            Vec2::new(self.min.x, self.min.z),
            Vec2::new(self.max.x, self.min.z),
            Vec2::new(self.max.x, self.max.z),
            Vec2::new(self.min.x, self.max.z),
        ]
    }

    pub fn center_xz(self) -> Vec2 {
        Vec2::new(mid(self.min.x, self.max.x), mid(self.min.z, self.max.z))
    }

    pub fn contains_xz(self, position: Vec3) -> bool {
        position.x >= self.min.x
            && position.x <= self.max.x
            && position.z >= self.min.z
            && position.z <= self.max.z
    }

    /// Squared horizontal distance to the closest point of the footprint,
    /// zero when `position` is inside.
    pub fn nearest_distance_xz_squared(self, position: Vec3) -> f32 {
        let dx = axis_distance(position.x, self.min.x, self.max.x);
        let dz = axis_distance(position.z, self.min.z, self.max.z);
        dx * dx + dz * dz
    }

    /// Squared horizontal distance to the farthest corner of the footprint.
    pub fn farthest_distance_xz_squared(self, position: Vec3) -> f32 {
        let dx = (position.x - self.min.x).abs().max((position.x - self.max.x).abs());
        let dz = (position.z - self.min.z).abs().max((position.z - self.max.z).abs());
        dx * dx + dz * dz
    }

    /// Normalized footprint coordinates of a horizontal position, relative to
    /// this box. Only meaningful on the terrain root box.
    pub fn uv_at(self, x: f32, z: f32) -> Vec2 {
        let size = self.max.xz() - self.min.xz();
        (Vec2::new(x, z) - self.min.xz()) / size
    }
}
