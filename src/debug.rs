//! Debug switches for the per-frame passes.

use bevy::prelude::*;

/// Adds the [`DebugTerrain`] resource and its keyboard controls.
pub struct TerrainDebugPlugin;

impl Plugin for TerrainDebugPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DebugTerrain>()
            .add_systems(Update, toggle_debug);
    }
}

#[derive(Clone, Default, Resource)]
pub struct DebugTerrain {
    /// Reuses the previous frame's selection and geometry.
    pub freeze: bool,
    /// Marks every block visible, bypassing the horizon test.
    pub disable_culling: bool,
    /// Logs per-view triangle and block counts every frame.
    pub show_stats: bool,
}

pub fn toggle_debug(input: Res<ButtonInput<KeyCode>>, mut debug_terrain: ResMut<DebugTerrain>) {
    if input.just_pressed(KeyCode::KeyF) {
        debug_terrain.freeze = !debug_terrain.freeze;
        info!(
            "froze the terrain geometry {}",
            if debug_terrain.freeze { "on" } else { "off" }
        );
    }
    if input.just_pressed(KeyCode::KeyC) {
        debug_terrain.disable_culling = !debug_terrain.disable_culling;
        info!(
            "toggled horizon culling {}",
            if debug_terrain.disable_culling { "off" } else { "on" }
        );
    }
    if input.just_pressed(KeyCode::KeyT) {
        debug_terrain.show_stats = !debug_terrain.show_stats;
        info!(
            "toggled the terrain stats {}",
            if debug_terrain.show_stats { "on" } else { "off" }
        );
    }
}
