use anyhow::{ensure, Result};
use bevy::{prelude::*, utils::HashMap};
use serde::{Deserialize, Serialize};

/// Marks a camera (or any other viewer, e.g. a shadow-casting light) whose
/// position drives culling and LOD selection.
#[derive(Clone, Copy, Component)]
pub struct TerrainView;

/// Per-view tuning of the culling and LOD passes.
///
/// Inserting a config into
/// [`TerrainViewComponents<TerrainViewConfig>`] for a (terrain, view) pair
/// opts that pair into processing; the quadtrees are built on the next
/// frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TerrainViewConfig {
    /// Number of angular sectors of the horizon buffer.
    pub horizon_resolution: usize,
    /// Screen-space error below which a region is rendered flat.
    pub error_threshold: f32,
    /// How fast the error estimate falls off with view distance.
    pub distance_factor: f32,
}

impl Default for TerrainViewConfig {
    fn default() -> Self {
        Self {
            horizon_resolution: 100,
            error_threshold: 0.001,
            distance_factor: 0.5,
        }
    }
}

impl TerrainViewConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.horizon_resolution > 0,
            "horizon resolution must be positive"
        );
        ensure!(
            self.error_threshold > 0.0 && self.error_threshold.is_finite(),
            "invalid error threshold {}",
            self.error_threshold
        );
        ensure!(
            self.distance_factor >= 0.0 && self.distance_factor.is_finite(),
            "invalid distance factor {}",
            self.distance_factor
        );

        Ok(())
    }
}

/// Stores a value of type `C` per (terrain, view) entity pair.
#[derive(Resource, Deref, DerefMut)]
pub struct TerrainViewComponents<C: Send + Sync + 'static>(HashMap<(Entity, Entity), C>);

impl<C: Send + Sync + 'static> Default for TerrainViewComponents<C> {
    fn default() -> Self {
        Self(HashMap::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_config_rejects_bad_setups() {
        assert!(TerrainViewConfig::default().validate().is_ok());

        let zero_sectors = TerrainViewConfig {
            horizon_resolution: 0,
            ..default()
        };
        assert!(zero_sectors.validate().is_err());

        let negative_threshold = TerrainViewConfig {
            error_threshold: -0.5,
            ..default()
        };
        assert!(negative_threshold.validate().is_err());
    }
}
