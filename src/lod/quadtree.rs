use crate::{
    frame::FrameStamp,
    height::HeightSource,
    math::{layout, TerrainAabb},
    terrain::TerrainConfig,
    terrain_view::TerrainViewConfig,
};
use bevy::prelude::*;
use itertools::iproduct;

/// Sentinel for an absent neighbour at the terrain boundary.
pub(crate) const INVALID_NODE: u32 = u32::MAX;

/// Grid resolution used to estimate a node's interpolation error.
const SAMPLES_PER_AXIS: usize = 5;

/// Grid offsets of the edge directions in the order the triangulator walks
/// them: top, right, bottom, left.
const DIRECTION_OFFSETS: [(i64, i64); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

#[derive(Clone)]
pub(crate) struct LodNode {
    /// Worst-case absolute error of the bilinear approximation spanned by
    /// the corner heights, estimated over a sample grid at build time.
    pub(crate) dmax: f32,
    pub(crate) min_height: f32,
    pub(crate) max_height: f32,
    /// Heights at the footprint corners in loop order (NW, NE, SE, SW).
    pub(crate) corner_heights: [f32; 4],
    pub(crate) center_height: f32,
    /// Same-level neighbours (top, right, bottom, left), across block seams,
    /// resolved once at build time.
    pub(crate) neighbours: [u32; 4],
    /// Stamp of the last pass that chose to subdivide this node.
    pub(crate) subdivided: FrameStamp,
}

impl Default for LodNode {
    fn default() -> Self {
        Self {
            dmax: 0.0,
            min_height: f32::INFINITY,
            max_height: f32::NEG_INFINITY,
            corner_heights: [0.0; 4],
            center_height: 0.0,
            neighbours: [INVALID_NODE; 4],
            subdivided: FrameStamp::NEVER,
        }
    }
}

/// The dynamic LOD forest: one fixed-depth quadtree per renderable block,
/// all living in a single arena so neighbour links cross block seams as
/// plain indices.
///
/// The trees are structurally immutable; the only per-frame mutation is the
/// `subdivided` stamp written by the selection pass and read back by the
/// triangulator.
pub struct LodQuadtree {
    pub(crate) nodes: Vec<LodNode>,
    pub(crate) blocks_per_axis: u32,
    /// Depth of each block's tree.
    pub(crate) depth: u32,
    pub(crate) error_threshold: f32,
    pub(crate) distance_factor: f32,
    /// Block footprints in arena order, derived through the same quartering
    /// chain as every traversal, so seam coordinates match bit for bit.
    pub(crate) block_rects: Vec<(u32, u32, TerrainAabb)>,
}

impl LodQuadtree {
    pub fn new(
        config: &TerrainConfig,
        view_config: &TerrainViewConfig,
        source: &dyn HeightSource,
    ) -> Self {
        let blocks_per_axis = 1u32 << config.quad_depth;
        let block_count = (blocks_per_axis * blocks_per_axis) as usize;

        let mut tree = Self {
            nodes: vec![LodNode::default(); block_count * layout::node_count(config.lod_depth)],
            blocks_per_axis,
            depth: config.lod_depth,
            error_threshold: view_config.error_threshold,
            distance_factor: view_config.distance_factor,
            block_rects: Vec::with_capacity(block_count),
        };

        tree.collect_blocks(0, 0, 0, config.bounds(), config.quad_depth);
        for index in 0..tree.block_rects.len() {
            let (bx, by, aabb) = tree.block_rects[index];
            let base = tree.block_base(bx, by);
            tree.build_node(base, 0, 0, 0, aabb, config.bounds(), source);
        }
        tree.resolve_neighbours();

        tree
    }

    /// Number of nodes a pass marked for subdivision.
    pub fn subdivided_count(&self, stamp: FrameStamp) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.subdivided == stamp)
            .count()
    }

    pub(crate) fn block_base(&self, bx: u32, by: u32) -> usize {
        ((by * self.blocks_per_axis + bx) as usize) * layout::node_count(self.depth)
    }

    /// Index of `child` (0..4) of the node at `index`.
    pub(crate) fn child_index(&self, index: usize, child: usize) -> usize {
        let tree_len = layout::node_count(self.depth);
        let base = index - index % tree_len;
        let (level, x, y) = layout::decompose(index % tree_len);
        debug_assert!(level < self.depth, "leaves have no children");

        base + layout::node_index(level + 1, 2 * x + child as u32 % 2, 2 * y + child as u32 / 2)
    }

    /// Splits the footprint down to the block grid, reusing the quadtree
    /// quartering so adjacent blocks share exact boundary coordinates.
    fn collect_blocks(&mut self, level: u32, x: u32, y: u32, aabb: TerrainAabb, quad_depth: u32) {
        if level == quad_depth {
            self.block_rects.push((x, y, aabb));
            return;
        }

        for child in 0..4 {
            self.collect_blocks(
                level + 1,
                2 * x + child as u32 % 2,
                2 * y + child as u32 / 2,
                aabb.child(child),
                quad_depth,
            );
        }
    }

    fn build_node(
        &mut self,
        base: usize,
        level: u32,
        x: u32,
        y: u32,
        aabb: TerrainAabb,
        bounds: TerrainAabb,
        source: &dyn HeightSource,
    ) -> (f32, f32) {
        let sample = |position: Vec2| {
            let uv = bounds.uv_at(position.x, position.y);
            source.height_clamped(uv.x, uv.y)
        };

        let corner_heights = aabb.corners_xz().map(|corner| sample(corner));
        let center_height = sample(aabb.center_xz());

        let mut dmax = 0.0f32;
        let mut min_height = f32::INFINITY;
        let mut max_height = f32::NEG_INFINITY;

        let step = 1.0 / (SAMPLES_PER_AXIS - 1) as f32;
        for (sy, sx) in iproduct!(0..SAMPLES_PER_AXIS, 0..SAMPLES_PER_AXIS) {
            let fx = sx as f32 * step;
            let fy = sy as f32 * step;
            let position = Vec2::new(
                aabb.min.x + fx * (aabb.max.x - aabb.min.x),
                aabb.min.z + fy * (aabb.max.z - aabb.min.z),
            );

            let height = sample(position);
            let approximated = bilinear(corner_heights, fx, fy);

            dmax = dmax.max((height - approximated).abs());
            min_height = min_height.min(height);
            max_height = max_height.max(height);
        }

        if level < self.depth {
            for child in 0..4 {
                let (child_min, child_max) = self.build_node(
                    base,
                    level + 1,
                    2 * x + child as u32 % 2,
                    2 * y + child as u32 / 2,
                    aabb.child(child),
                    bounds,
                    source,
                );

                min_height = min_height.min(child_min);
                max_height = max_height.max(child_max);
            }
        }

        let node = &mut self.nodes[base + layout::node_index(level, x, y)];
        node.dmax = dmax;
        node.min_height = min_height;
        node.max_height = max_height;
        node.corner_heights = corner_heights;
        node.center_height = center_height;

        (min_height, max_height)
    }

    /// Links every node to its four same-level neighbours. Within a block
    /// and across block seams the lookup is the same: global grid coordinate
    /// at the level, decomposed back into block and local indices.
    fn resolve_neighbours(&mut self) {
        let blocks = self.blocks_per_axis;

        for (by, bx) in iproduct!(0..blocks, 0..blocks) {
            let base = self.block_base(bx, by);

            for level in 0..=self.depth {
                let per_block = 1u32 << level;
                let total = (blocks * per_block) as i64;

                for (y, x) in iproduct!(0..per_block, 0..per_block) {
                    let gx = (bx * per_block + x) as i64;
                    let gy = (by * per_block + y) as i64;

                    let mut neighbours = [INVALID_NODE; 4];
                    for (direction, &(dx, dy)) in DIRECTION_OFFSETS.iter().enumerate() {
                        let nx = gx + dx;
                        let ny = gy + dy;
                        if nx >= 0 && nx < total && ny >= 0 && ny < total {
                            neighbours[direction] =
                                self.global_index(level, nx as u32, ny as u32) as u32;
                        }
                    }

                    self.nodes[base + layout::node_index(level, x, y)].neighbours = neighbours;
                }
            }
        }
    }

    fn global_index(&self, level: u32, gx: u32, gy: u32) -> usize {
        let per_block = 1u32 << level;
        self.block_base(gx / per_block, gy / per_block)
            + layout::node_index(level, gx % per_block, gy % per_block)
    }
}

/// Bilinear interpolation of the corner heights (NW, NE, SE, SW) at the
/// fractional footprint position `(fx, fy)`.
fn bilinear(corners: [f32; 4], fx: f32, fy: f32) -> f32 {
    let [nw, ne, se, sw] = corners;
    let top = nw * (1.0 - fx) + ne * fx;
    let bottom = sw * (1.0 - fx) + se * fx;
    top * (1.0 - fy) + bottom * fy
}
