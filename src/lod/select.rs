use crate::{
    frame::FrameStamp,
    lod::quadtree::LodQuadtree,
    math::{axis_distance, layout, TerrainAabb},
    visibility::VisibilityQuadtree,
};
use bevy::prelude::*;

/// The estimated on-screen error of rendering a region flat instead of
/// subdividing it: the build-time interpolation error attenuated by the
/// squared distance between the view and the region's box. Per-axis
/// distances are clamped to zero while the view is inside the extent.
pub(crate) fn screen_error(
    dmax: f32,
    distance_factor: f32,
    view: Vec3,
    aabb: TerrainAabb,
    min_height: f32,
    max_height: f32,
) -> f32 {
    let dx = axis_distance(view.x, aabb.min.x, aabb.max.x);
    let dy = axis_distance(view.y, min_height, max_height);
    let dz = axis_distance(view.z, aabb.min.z, aabb.max.z);

    dmax / (1.0 + distance_factor * distance_factor * (dx * dx + dy * dy + dz * dz))
}

impl LodQuadtree {
    /// Decides, for every visible block, which regions must subdivide this
    /// frame. Runs after the visibility pass of the same stamp; geometry
    /// that will not be drawn is never refined.
    pub fn compute_lod(
        &mut self,
        stamp: FrameStamp,
        view_position: Vec3,
        visibility: &VisibilityQuadtree,
    ) {
        debug_assert_eq!(visibility.blocks_per_axis(), self.blocks_per_axis);

        for index in 0..self.block_rects.len() {
            let (bx, by, aabb) = self.block_rects[index];
            if !visibility.leaf_visible(bx, by, stamp) {
                continue;
            }

            self.select(self.block_base(bx, by), 0, 0, 0, aabb, stamp, view_position);
        }
    }

    fn select(
        &mut self,
        base: usize,
        level: u32,
        x: u32,
        y: u32,
        aabb: TerrainAabb,
        stamp: FrameStamp,
        view: Vec3,
    ) {
        let index = base + layout::node_index(level, x, y);
        let error = {
            let node = &self.nodes[index];
            screen_error(
                node.dmax,
                self.distance_factor,
                view,
                aabb,
                node.min_height,
                node.max_height,
            )
        };

        // Depth-limit leaves never subdivide, whatever their error.
        if level == self.depth || error < self.error_threshold {
            return;
        }

        self.nodes[index].subdivided = stamp;
        for child in 0..4 {
            self.select(
                base,
                level + 1,
                2 * x + child as u32 % 2,
                2 * y + child as u32 / 2,
                aabb.child(child),
                stamp,
                view,
            );
        }
    }
}
