use crate::{
    frame::FrameStamp,
    height::HeightSource,
    math::{layout, TerrainAabb},
    terrain::TerrainConfig,
    terrain_view::TerrainViewConfig,
    visibility::{
        horizon::{HorizonBuffer, SectorRange},
        sector::{SectorTable, MIN_HORIZONTAL_DISTANCE},
    },
};
use bevy::{math::Vec3Swizzles, prelude::*};
use itertools::iproduct;

/// Grid resolution used to estimate the height extrema of a leaf.
const SAMPLES_PER_AXIS: usize = 5;

#[derive(Clone)]
struct VisibilityNode {
    min_height: f32,
    max_height: f32,
    visible: FrameStamp,
}

impl Default for VisibilityNode {
    fn default() -> Self {
        Self {
            min_height: f32::INFINITY,
            max_height: f32::NEG_INFINITY,
            visible: FrameStamp::NEVER,
        }
    }
}

/// The static occlusion quadtree over the terrain footprint.
///
/// Built once per terrain and view by sampling the height source; leaves
/// correspond to the renderable blocks of the LOD forest. Per frame,
/// [`compute_visibility`](Self::compute_visibility) walks the tree front to
/// back, testing each node's angular extent against the horizon buffer and
/// raising the horizon with every visible node, so near terrain occludes what
/// lies behind it.
pub struct VisibilityQuadtree {
    nodes: Vec<VisibilityNode>,
    depth: u32,
    bounds: TerrainAabb,
    sector_table: SectorTable,
}

impl VisibilityQuadtree {
    pub fn new(
        config: &TerrainConfig,
        view_config: &TerrainViewConfig,
        source: &dyn HeightSource,
    ) -> Self {
        let bounds = config.bounds();
        let mut tree = Self {
            nodes: vec![VisibilityNode::default(); layout::node_count(config.quad_depth)],
            depth: config.quad_depth,
            bounds,
            sector_table: SectorTable::new(view_config.horizon_resolution),
        };

        tree.build(0, 0, 0, bounds, source);
        tree
    }

    /// Number of leaf blocks along each axis of the footprint.
    pub fn blocks_per_axis(&self) -> u32 {
        1 << self.depth
    }

    /// Whether the leaf block `(x, y)` was marked visible by the pass that
    /// used `stamp`.
    pub fn leaf_visible(&self, x: u32, y: u32, stamp: FrameStamp) -> bool {
        self.nodes[layout::node_index(self.depth, x, y)].visible == stamp
    }

    /// Samples the extrema of a leaf and combines them upwards, mirroring the
    /// one-time setup of the renderer this pass belongs to.
    fn build(
        &mut self,
        level: u32,
        x: u32,
        y: u32,
        aabb: TerrainAabb,
        source: &dyn HeightSource,
    ) -> (f32, f32) {
        let mut min_height = f32::INFINITY;
        let mut max_height = f32::NEG_INFINITY;

        if level == self.depth {
            let step = 1.0 / (SAMPLES_PER_AXIS - 1) as f32;
            for (sy, sx) in iproduct!(0..SAMPLES_PER_AXIS, 0..SAMPLES_PER_AXIS) {
                let position_x = aabb.min.x + sx as f32 * step * (aabb.max.x - aabb.min.x);
                let position_z = aabb.min.z + sy as f32 * step * (aabb.max.z - aabb.min.z);
                let uv = self.bounds.uv_at(position_x, position_z);
                let height = source.height_clamped(uv.x, uv.y);

                min_height = min_height.min(height);
                max_height = max_height.max(height);
            }
        } else {
            for child in 0..4 {
                let (child_min, child_max) = self.build(
                    level + 1,
                    2 * x + child as u32 % 2,
                    2 * y + child as u32 / 2,
                    aabb.child(child),
                    source,
                );

                min_height = min_height.min(child_min);
                max_height = max_height.max(child_max);
            }
        }

        let node = &mut self.nodes[layout::node_index(level, x, y)];
        node.min_height = min_height;
        node.max_height = max_height;

        (min_height, max_height)
    }

    /// Runs the occlusion pass for one view position (terrain-local space).
    ///
    /// Marks every node that can contribute to the image with `stamp`; a
    /// fresh stamp per pass doubles as the "mark all invisible" reset.
    pub fn compute_visibility(
        &mut self,
        stamp: FrameStamp,
        view_position: Vec3,
        horizon: &mut HorizonBuffer,
    ) {
        debug_assert_eq!(horizon.sectors(), self.sector_table.sectors());

        horizon.reset();
        self.visit(0, 0, 0, self.bounds, stamp, view_position, horizon);
    }

    /// Marks the whole tree visible, bypassing the horizon test. Used when
    /// culling is disabled for debugging.
    pub fn mark_all_visible(&mut self, stamp: FrameStamp) {
        for node in &mut self.nodes {
            node.visible = stamp;
        }
    }

    fn visit(
        &mut self,
        level: u32,
        x: u32,
        y: u32,
        aabb: TerrainAabb,
        stamp: FrameStamp,
        view: Vec3,
        horizon: &mut HorizonBuffer,
    ) {
        let index = layout::node_index(level, x, y);
        let (min_height, max_height) = {
            let node = &self.nodes[index];
            (node.min_height, node.max_height)
        };

        let inside = aabb.contains_xz(view);
        let range = if inside {
            SectorRange::full(self.sector_table.sectors())
        } else {
            self.sector_range(aabb, view)
        };
        let (min_elevation, max_elevation) =
            elevation_extrema(aabb, min_height, max_height, view);

        if !inside && !horizon.is_above(range, max_elevation) {
            // The whole subtree stays below the horizon.
            return;
        }

        self.nodes[index].visible = stamp;
        horizon.heighten(range, min_elevation);

        if level == self.depth {
            return;
        }

        // Front to back: the child under the view first, then the two
        // edge-adjacent ones, then the diagonal. A near child must raise the
        // horizon before a far child is tested.
        let center = aabb.center_xz();
        let nearest = (view.x > center.x) as usize + 2 * ((view.z > center.y) as usize);

        for child in [nearest, nearest ^ 1, nearest ^ 2, nearest ^ 3] {
            self.visit(
                level + 1,
                2 * x + child as u32 % 2,
                2 * y + child as u32 / 2,
                aabb.child(child),
                stamp,
                view,
                horizon,
            );
        }
    }

    /// The angular extent of a footprint seen from outside: the two
    /// silhouette corners, selected by the view's region around the box,
    /// mapped into sectors.
    fn sector_range(&self, aabb: TerrainAabb, view: Vec3) -> SectorRange {
        let [nw, ne, se, sw] = aabb.corners_xz();

        let region_x = region(view.x, aabb.min.x, aabb.max.x);
        let region_z = region(view.z, aabb.min.z, aabb.max.z);

        let (a, b) = match (region_x, region_z) {
            (0, 0) => (ne, sw),
            (1, 0) => (nw, ne),
            (2, 0) => (nw, se),
            (0, 1) => (nw, sw),
            (2, 1) => (ne, se),
            (0, 2) => (nw, se),
            (1, 2) => (sw, se),
            (2, 2) => (ne, sw),
            _ => unreachable!("view inside the footprint is handled by the caller"),
        };

        SectorRange::arc(
            self.sector_table.sector(a - view.xz()),
            self.sector_table.sector(b - view.xz()),
            self.sector_table.sectors(),
        )
    }
}

#[inline]
fn region(value: f32, min: f32, max: f32) -> u32 {
    if value < min {
        0
    } else if value > max {
        2
    } else {
        1
    }
}

/// The lowest and highest elevation angle any point of the box can reach.
///
/// The numerator is the height difference to the view, the denominator the
/// horizontal distance; which of the nearest/farthest distances maximizes or
/// minimizes the ratio depends on the sign of the numerator.
fn elevation_extrema(
    aabb: TerrainAabb,
    min_height: f32,
    max_height: f32,
    view: Vec3,
) -> (f32, f32) {
    let near = aabb
        .nearest_distance_xz_squared(view)
        .sqrt()
        .max(MIN_HORIZONTAL_DISTANCE);
    let far = aabb
        .farthest_distance_xz_squared(view)
        .sqrt()
        .max(MIN_HORIZONTAL_DISTANCE);

    let below = min_height - view.y;
    let above = max_height - view.y;

    let max_elevation = if above > 0.0 { above / near } else { above / far };
    let min_elevation = if below > 0.0 { below / far } else { below / near };

    (min_elevation, max_elevation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameCounter;
    use itertools::iproduct;

    fn flat_config() -> TerrainConfig {
        TerrainConfig::new(100.0, 0.0, 80.0, 2, 2).unwrap()
    }

    fn build(config: &TerrainConfig, source: impl HeightSource) -> (VisibilityQuadtree, HorizonBuffer) {
        let view_config = TerrainViewConfig::default();
        let tree = VisibilityQuadtree::new(config, &view_config, &source);
        let horizon = HorizonBuffer::new(view_config.horizon_resolution);
        (tree, horizon)
    }

    #[test]
    fn flat_field_from_above_is_fully_visible() {
        let config = flat_config();
        let (mut tree, mut horizon) = build(&config, |_: f32, _: f32| 0.0);
        let mut counter = FrameCounter::default();

        let stamp = counter.next();
        tree.compute_visibility(stamp, Vec3::new(50.0, 100.0, 50.0), &mut horizon);

        for (y, x) in iproduct!(0..4, 0..4) {
            assert!(tree.leaf_visible(x, y, stamp), "block ({x}, {y}) culled");
        }
    }

    #[test]
    fn blocks_behind_a_wall_are_culled() {
        // A wall of height 60 spanning the second block row; the view stands
        // low in the first row. Rows up to and touching the wall stay
        // visible, the row entirely behind it is occluded.
        let config = flat_config();
        let wall = |_u: f32, v: f32| if (0.25..=0.5).contains(&v) { 60.0 } else { 0.0 };
        let (mut tree, mut horizon) = build(&config, wall);
        let mut counter = FrameCounter::default();

        let stamp = counter.next();
        tree.compute_visibility(stamp, Vec3::new(51.0, 1.0, 5.0), &mut horizon);

        for (y, x) in iproduct!(0..3, 0..4) {
            assert!(tree.leaf_visible(x, y, stamp), "block ({x}, {y}) culled");
        }
        for x in 0..4 {
            assert!(!tree.leaf_visible(x, 3, stamp), "block ({x}, 3) not culled");
        }
    }

    #[test]
    fn repeated_resets_are_idempotent() {
        let config = flat_config();
        let wall = |_u: f32, v: f32| if (0.25..=0.5).contains(&v) { 60.0 } else { 0.0 };
        let (mut tree, mut horizon) = build(&config, wall);
        let mut counter = FrameCounter::default();
        let view = Vec3::new(51.0, 1.0, 5.0);

        let first = counter.next();
        tree.compute_visibility(first, view, &mut horizon);
        let marks_after_one: Vec<bool> = iproduct!(0..4, 0..4)
            .map(|(y, x)| tree.leaf_visible(x, y, first))
            .collect();

        // Draw (and discard) stamps twice before the next pass; the extra
        // reset must not change anything.
        counter.next();
        counter.next();
        let second = counter.next();
        tree.compute_visibility(second, view, &mut horizon);
        let marks_after_two: Vec<bool> = iproduct!(0..4, 0..4)
            .map(|(y, x)| tree.leaf_visible(x, y, second))
            .collect();

        assert_eq!(marks_after_one, marks_after_two);
    }

    #[test]
    fn stale_stamps_read_as_invisible() {
        let config = flat_config();
        let (mut tree, mut horizon) = build(&config, |_: f32, _: f32| 0.0);
        let mut counter = FrameCounter::default();

        let old = counter.next();
        tree.compute_visibility(old, Vec3::new(50.0, 100.0, 50.0), &mut horizon);
        assert!(tree.leaf_visible(0, 0, old));

        let new = counter.next();
        assert!(!tree.leaf_visible(0, 0, new));
    }

    #[test]
    fn elevation_extrema_sign_cases() {
        let aabb = TerrainAabb::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(20.0, 0.0, 10.0));
        let view = Vec3::new(0.0, 5.0, 5.0);

        // Box entirely below the view: both extrema negative, the highest
        // angle comes from the farthest corner.
        let (min_elevation, max_elevation) = elevation_extrema(aabb, 0.0, 2.0, view);
        assert!(max_elevation < 0.0);
        assert!(min_elevation < max_elevation);
        assert!((max_elevation - (2.0 - 5.0) / aabb.farthest_distance_xz_squared(view).sqrt()).abs() < 1e-6);

        // Box spanning the view height: extrema straddle zero and the
        // highest angle uses the nearest distance.
        let (min_elevation, max_elevation) = elevation_extrema(aabb, 0.0, 50.0, view);
        assert!(min_elevation < 0.0 && max_elevation > 0.0);
        assert!((max_elevation - 45.0 / 10.0).abs() < 1e-6);
    }
}
