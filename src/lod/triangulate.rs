use crate::{
    frame::FrameStamp,
    lod::quadtree::{LodNode, LodQuadtree, INVALID_NODE},
    math::{layout, mid, TerrainAabb},
    visibility::VisibilityQuadtree,
};
use bevy::prelude::*;

bitflags::bitflags! {
    /// Edges of a node bordering a neighbour that subdivided this frame.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct EdgeMask: u8 {
        const TOP = 1 << 0;
        const RIGHT = 1 << 1;
        const BOTTOM = 1 << 2;
        const LEFT = 1 << 3;
    }
}

/// Children of a subdivided neighbour bordering the shared edge, in the
/// order the edge is walked (see the corner loop order NW, NE, SE, SW).
const EDGE_CHILDREN: [[usize; 2]; 4] = [
    [2, 3], // top edge, walked west to east: neighbour's SW then SE child
    [0, 2], // right edge, north to south: NW then SW child
    [1, 0], // bottom edge, east to west: NE then NW child
    [3, 1], // left edge, south to north: SE then NE child
];

/// Corner of the first edge child whose position is the edge midpoint.
const EDGE_MIDPOINT_CORNER: [usize; 4] = [2, 3, 0, 1];

impl LodQuadtree {
    /// Emits the terrain surface for every visible block as a watertight
    /// triangle list.
    ///
    /// Runs after [`compute_lod`](Self::compute_lod) with the same stamp: a
    /// subdivided node recurses, a node without finer neighbours emits two
    /// triangles, and a node bordering finer detail emits a fan around its
    /// center whose edges split until they match the neighbour's vertices
    /// exactly. The callback receives world-space (terrain-local) triangles.
    pub fn triangulate(
        &self,
        stamp: FrameStamp,
        visibility: &VisibilityQuadtree,
        emit: &mut dyn FnMut(Vec3, Vec3, Vec3),
    ) {
        for &(bx, by, aabb) in &self.block_rects {
            if !visibility.leaf_visible(bx, by, stamp) {
                continue;
            }

            self.emit_node(self.block_base(bx, by), 0, 0, 0, aabb, stamp, emit);
        }
    }

    fn emit_node(
        &self,
        base: usize,
        level: u32,
        x: u32,
        y: u32,
        aabb: TerrainAabb,
        stamp: FrameStamp,
        emit: &mut dyn FnMut(Vec3, Vec3, Vec3),
    ) {
        let index = base + layout::node_index(level, x, y);
        let node = &self.nodes[index];

        if node.subdivided == stamp {
            for child in 0..4 {
                self.emit_node(
                    base,
                    level + 1,
                    2 * x + child as u32 % 2,
                    2 * y + child as u32 / 2,
                    aabb.child(child),
                    stamp,
                    emit,
                );
            }
            return;
        }

        let corners = aabb.corners_xz();
        let corner = |loop_index: usize| {
            Vec3::new(
                corners[loop_index].x,
                node.corner_heights[loop_index],
                corners[loop_index].y,
            )
        };

        if self.finer_edges(node, stamp).is_empty() {
            emit(corner(1), corner(0), corner(3));
            emit(corner(1), corner(3), corner(2));
            return;
        }

        let center_xz = aabb.center_xz();
        let center = Vec3::new(center_xz.x, node.center_height, center_xz.y);

        for direction in 0..4 {
            self.emit_edge(
                direction,
                center,
                corner(direction),
                corner((direction + 1) % 4),
                node.neighbours[direction],
                stamp,
                emit,
            );
        }
    }

    fn finer_edges(&self, node: &LodNode, stamp: FrameStamp) -> EdgeMask {
        let mut mask = EdgeMask::empty();

        for (direction, &neighbour) in node.neighbours.iter().enumerate() {
            if neighbour != INVALID_NODE && self.nodes[neighbour as usize].subdivided == stamp {
                mask |= EdgeMask::from_bits_truncate(1 << direction);
            }
        }

        mask
    }

    /// Emits the fan triangles of one edge, delegating to the neighbour's
    /// subdivision: a neighbour of the same or coarser detail gets a single
    /// triangle, a finer one splits the edge at its midpoint and recurses
    /// into the two children bordering it. The recursion mirrors the fine
    /// side's depth exactly, which is what keeps the seam free of cracks.
    fn emit_edge(
        &self,
        direction: usize,
        center: Vec3,
        a: Vec3,
        b: Vec3,
        neighbour: u32,
        stamp: FrameStamp,
        emit: &mut dyn FnMut(Vec3, Vec3, Vec3),
    ) {
        let split = neighbour != INVALID_NODE
            && self.nodes[neighbour as usize].subdivided == stamp;

        if !split {
            emit(center, b, a);
            return;
        }

        let [first, second] = EDGE_CHILDREN[direction];
        let first_index = self.child_index(neighbour as usize, first);
        let second_index = self.child_index(neighbour as usize, second);

        // The midpoint is a corner of the neighbour's children; reusing its
        // cached height keeps both sides of the seam bit-identical.
        let midpoint = Vec3::new(
            mid(a.x, b.x),
            self.nodes[first_index].corner_heights[EDGE_MIDPOINT_CORNER[direction]],
            mid(a.z, b.z),
        );

        self.emit_edge(direction, center, a, midpoint, first_index as u32, stamp, emit);
        self.emit_edge(direction, center, midpoint, b, second_index as u32, stamp, emit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::FrameCounter,
        height::HeightSource,
        terrain::TerrainConfig,
        terrain_view::TerrainViewConfig,
    };
    use std::collections::BTreeSet;

    fn setup(
        quad_depth: u32,
        lod_depth: u32,
        source: impl HeightSource,
        view_config: TerrainViewConfig,
    ) -> (VisibilityQuadtree, LodQuadtree) {
        let config = TerrainConfig::new(100.0, -50.0, 50.0, quad_depth, lod_depth).unwrap();
        (
            VisibilityQuadtree::new(&config, &view_config, &source),
            LodQuadtree::new(&config, &view_config, &source),
        )
    }

    fn collect(
        lod: &LodQuadtree,
        visibility: &VisibilityQuadtree,
        stamp: crate::frame::FrameStamp,
    ) -> Vec<[Vec3; 3]> {
        let mut triangles = Vec::new();
        lod.triangulate(stamp, visibility, &mut |a, b, c| triangles.push([a, b, c]));
        triangles
    }

    #[test]
    fn flat_field_emits_two_triangles_per_block() {
        let (mut visibility, mut lod) =
            setup(2, 2, |_: f32, _: f32| 0.0, TerrainViewConfig::default());
        let mut counter = FrameCounter::default();
        let mut horizon = crate::visibility::HorizonBuffer::new(100);

        let stamp = counter.next();
        let view = Vec3::new(50.0, 100.0, 50.0);
        visibility.compute_visibility(stamp, view, &mut horizon);
        lod.compute_lod(stamp, view, &visibility);
        let triangles = collect(&lod, &visibility, stamp);

        assert_eq!(lod.subdivided_count(stamp), 0);
        assert_eq!(triangles.len(), 2 * 16);
    }

    #[test]
    fn invisible_blocks_emit_nothing() {
        let (visibility, lod) = setup(1, 1, |_: f32, _: f32| 0.0, TerrainViewConfig::default());
        let mut counter = FrameCounter::default();

        // No visibility pass ran for this stamp.
        let stamp = counter.next();
        let triangles = collect(&lod, &visibility, stamp);

        assert!(triangles.is_empty());
    }

    /// High-frequency relief confined to the north-west block; the three
    /// other blocks stay flat.
    fn north_west_rough(u: f32, v: f32) -> f32 {
        if u < 0.5 && v < 0.5 {
            10.0 * (37.3 * u).sin() * (29.7 * v).sin()
        } else {
            0.0
        }
    }

    fn rough_scene() -> (VisibilityQuadtree, LodQuadtree, crate::frame::FrameStamp) {
        // distance_factor zero makes the error view-independent, so the
        // rough block subdivides fully and the flat ones not at all.
        let view_config = TerrainViewConfig {
            error_threshold: 0.01,
            distance_factor: 0.0,
            ..default()
        };
        let (mut visibility, mut lod) = setup(1, 3, north_west_rough, view_config);
        let mut counter = FrameCounter::default();

        let stamp = counter.next();
        visibility.mark_all_visible(stamp);
        lod.compute_lod(stamp, Vec3::new(50.0, 20.0, 50.0), &visibility);

        // The north-west block must be subdivided to the depth limit.
        let tree_len = lod.nodes.len() / 4;
        assert_eq!(
            lod.nodes[..tree_len]
                .iter()
                .filter(|node| node.subdivided == stamp)
                .count(),
            1 + 4 + 16
        );

        (visibility, lod, stamp)
    }

    #[test]
    fn stitched_mesh_has_expected_triangle_count() {
        let (visibility, lod, stamp) = rough_scene();
        let triangles = collect(&lod, &visibility, stamp);

        // North-west block: 64 leaf quads. North-east and south-west: fans
        // whose edge facing the rough block splits into 8, the other three
        // edges one triangle each (two of them terrain boundary). South
        // east: two plain triangles.
        assert_eq!(triangles.len(), 128 + 11 + 11 + 2);
    }

    #[test]
    fn seams_are_crack_free() {
        let (visibility, lod, stamp) = rough_scene();
        let triangles = collect(&lod, &visibility, stamp);

        // Vertical seam between the west and east block columns.
        let seam_x = mid(0.0, 100.0);
        let mut west: BTreeSet<(u32, u32)> = BTreeSet::new();
        let mut east: BTreeSet<(u32, u32)> = BTreeSet::new();

        for triangle in &triangles {
            let on_seam: Vec<Vec3> = triangle
                .iter()
                .copied()
                .filter(|vertex| vertex.x == seam_x)
                .collect();
            if on_seam.is_empty() {
                continue;
            }

            let west_side = triangle.iter().any(|vertex| vertex.x < seam_x);
            let east_side = triangle.iter().any(|vertex| vertex.x > seam_x);
            assert!(west_side != east_side, "degenerate seam triangle");

            let set = if west_side { &mut west } else { &mut east };
            for vertex in on_seam {
                set.insert((vertex.z.to_bits(), vertex.y.to_bits()));
            }
        }

        assert!(west.len() >= 9, "seam unexpectedly coarse: {}", west.len());
        assert_eq!(west, east);
    }

    #[test]
    fn horizontal_seams_are_crack_free_too() {
        let (visibility, lod, stamp) = rough_scene();
        let triangles = collect(&lod, &visibility, stamp);

        let seam_z = mid(0.0, 100.0);
        let mut north: BTreeSet<(u32, u32)> = BTreeSet::new();
        let mut south: BTreeSet<(u32, u32)> = BTreeSet::new();

        for triangle in &triangles {
            let on_seam: Vec<Vec3> = triangle
                .iter()
                .copied()
                .filter(|vertex| vertex.z == seam_z)
                .collect();
            if on_seam.is_empty() {
                continue;
            }

            let north_side = triangle.iter().any(|vertex| vertex.z < seam_z);
            let south_side = triangle.iter().any(|vertex| vertex.z > seam_z);
            assert!(north_side != south_side, "degenerate seam triangle");

            let set = if north_side { &mut north } else { &mut south };
            for vertex in on_seam {
                set.insert((vertex.x.to_bits(), vertex.y.to_bits()));
            }
        }

        assert!(north.len() >= 9);
        assert_eq!(north, south);
    }

    #[test]
    fn triangles_share_consistent_winding() {
        let (visibility, lod, stamp) = rough_scene();
        let triangles = collect(&lod, &visibility, stamp);

        for [a, b, c] in &triangles {
            let cross = (b.x - a.x) * (c.z - a.z) - (b.z - a.z) * (c.x - a.x);
            assert!(cross < 0.0, "winding flipped for {a} {b} {c}");
        }
    }
}
