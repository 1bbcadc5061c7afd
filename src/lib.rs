//! This crate decides which parts of a height-field terrain are worth
//! rendering, and how finely, every frame.
//!
//! # Background
//! There are two critical questions a terrain renderer has to answer each
//! frame without touching every polygon:
//!
//! ## Which parts of the terrain can be seen at all?
//! Terrain is its own best occluder: a ridge near the camera hides entire
//! valleys behind it. The [`visibility`] module builds a static quadtree of
//! height extrema over the footprint and walks it front to back, maintaining
//! an angular horizon around the view position. Regions whose highest
//! possible elevation angle stays below the horizon of everything drawn in
//! front of them are skipped, subtree and all.
//!
//! ## How densely must the visible parts be triangulated?
//! A distant mountainside needs a handful of triangles, the ground under the
//! camera needs thousands. The [`lod`] module precomputes, per quadtree
//! region, the worst-case error of rendering it flat, and each frame selects
//! a subdivision whose estimated on-screen error stays below a threshold.
//! Neighbouring regions of different density are stitched with recursive
//! edge fans, so the emitted mesh is watertight with no cracks at the seams.
//!
//! Both passes and the triangulation between them are plain CPU systems; the
//! resulting per-view triangle list is handed to the surrounding renderer,
//! which remains responsible for materials, textures and rasterization.
//!
//! Setup mirrors the rest of the plugin family: spawn a [`TerrainBundle`]
//! and a [`TerrainView`] entity, then insert a [`TerrainViewConfig`] for the
//! pair into [`TerrainViewComponents`].

use crate::{
    frame::{FrameCounter, FrameStamp},
    lod::LodQuadtree,
    mesh::TerrainMesh,
    systems::{compute_lod, compute_visibility, initialize_terrain_views, triangulate},
    terrain::TerrainConfig,
    terrain_view::{TerrainViewComponents, TerrainViewConfig},
    visibility::{HorizonBuffer, VisibilityQuadtree},
};
use bevy::prelude::*;
use bevy_common_assets::ron::RonAssetPlugin;

pub mod debug;
pub mod frame;
pub mod height;
pub mod lod;
pub mod math;
pub mod mesh;
pub mod terrain;
pub mod terrain_view;
pub mod visibility;

mod systems;

#[allow(missing_docs)]
pub mod prelude {
    #[doc(hidden)]
    pub use crate::{
        debug::{DebugTerrain, TerrainDebugPlugin},
        frame::{FrameCounter, FrameStamp},
        height::{HeightRaster, HeightSource},
        lod::LodQuadtree,
        math::TerrainAabb,
        mesh::{TerrainMesh, TerrainVertex},
        terrain::{Terrain, TerrainBundle, TerrainConfig, TerrainHeightField},
        terrain_view::{TerrainView, TerrainViewComponents, TerrainViewConfig},
        visibility::{HorizonBuffer, VisibilityQuadtree},
        TerrainPlugin,
    };
}

pub use crate::{
    terrain::{Terrain, TerrainBundle},
    terrain_view::TerrainView,
};

/// The plugin running the culling, LOD selection and triangulation passes.
pub struct TerrainPlugin;

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<TerrainConfig>::new(&["terrain.ron"]))
            .init_resource::<FrameCounter>()
            .init_resource::<TerrainViewComponents<TerrainViewConfig>>()
            .init_resource::<TerrainViewComponents<VisibilityQuadtree>>()
            .init_resource::<TerrainViewComponents<LodQuadtree>>()
            .init_resource::<TerrainViewComponents<HorizonBuffer>>()
            .init_resource::<TerrainViewComponents<FrameStamp>>()
            .init_resource::<TerrainViewComponents<TerrainMesh>>()
            .add_systems(
                Last,
                (
                    initialize_terrain_views,
                    compute_visibility,
                    compute_lod,
                    triangulate,
                )
                    .chain(),
            );
    }
}
