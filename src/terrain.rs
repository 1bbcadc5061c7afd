use crate::height::HeightSource;
use crate::math::TerrainAabb;
use anyhow::{ensure, Result};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Deeper trees are a configuration error; the traversals recurse once per
/// level and the node count grows with 4^depth.
const MAX_DEPTH: u32 = 8;

/// Marks an entity as a terrain.
#[derive(Clone, Copy, Component)]
pub struct Terrain;

/// The static configuration of a terrain.
///
/// Loadable as a RON asset (`.terrain.ron`) or constructed directly via
/// [`TerrainConfig::new`]. Validation happens once at setup; an invalid
/// configuration aborts the spawn instead of degrading into visual
/// corruption later.
#[derive(Asset, TypePath, Component, Clone, Debug, Serialize, Deserialize)]
pub struct TerrainConfig {
    /// Side length of the square footprint in world units.
    pub side_length: f32,
    /// Lower bound of the height range the height source may produce.
    pub min_height: f32,
    /// Upper bound of the height range.
    pub max_height: f32,
    /// Depth of the visibility quadtree; its leaves are the renderable
    /// blocks, `4^quad_depth` of them.
    pub quad_depth: u32,
    /// Depth of each block's LOD quadtree.
    pub lod_depth: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            side_length: 1024.0,
            min_height: 0.0,
            max_height: 100.0,
            quad_depth: 3,
            lod_depth: 4,
        }
    }
}

impl TerrainConfig {
    pub fn new(
        side_length: f32,
        min_height: f32,
        max_height: f32,
        quad_depth: u32,
        lod_depth: u32,
    ) -> Result<Self> {
        let config = Self {
            side_length,
            min_height,
            max_height,
            quad_depth,
            lod_depth,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.side_length > 0.0 && self.side_length.is_finite(),
            "invalid terrain side length {}",
            self.side_length
        );
        ensure!(
            self.min_height <= self.max_height,
            "inverted height range [{}, {}]",
            self.min_height,
            self.max_height
        );
        ensure!(
            (1..=MAX_DEPTH).contains(&self.quad_depth),
            "quad depth {} outside 1..={MAX_DEPTH}",
            self.quad_depth
        );
        ensure!(
            (1..=MAX_DEPTH).contains(&self.lod_depth),
            "lod depth {} outside 1..={MAX_DEPTH}",
            self.lod_depth
        );

        Ok(())
    }

    /// The terrain-local bounding box of the whole footprint.
    pub fn bounds(&self) -> TerrainAabb {
        TerrainAabb::new(
            Vec3::new(0.0, self.min_height, 0.0),
            Vec3::new(self.side_length, self.max_height, self.side_length),
        )
    }
}

/// The height source of a terrain, shared with the per-view build steps.
#[derive(Component, Clone)]
pub struct TerrainHeightField(Arc<dyn HeightSource>);

impl TerrainHeightField {
    pub fn new(source: impl HeightSource) -> Self {
        Self(Arc::new(source))
    }

    pub fn source(&self) -> &dyn HeightSource {
        self.0.as_ref()
    }
}

#[derive(Bundle)]
pub struct TerrainBundle {
    terrain: Terrain,
    config: TerrainConfig,
    height_field: TerrainHeightField,
    transform: Transform,
    global_transform: GlobalTransform,
}

impl TerrainBundle {
    /// Validates the configuration and assembles a spawnable terrain.
    pub fn new(config: TerrainConfig, height_source: impl HeightSource) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            terrain: Terrain,
            config,
            height_field: TerrainHeightField::new(height_source),
            transform: Transform::default(),
            global_transform: GlobalTransform::default(),
        })
    }
}
