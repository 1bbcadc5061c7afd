use crate::{
    debug::DebugTerrain,
    frame::{FrameCounter, FrameStamp},
    lod::LodQuadtree,
    mesh::TerrainMesh,
    terrain::{Terrain, TerrainConfig, TerrainHeightField},
    terrain_view::{TerrainView, TerrainViewComponents, TerrainViewConfig},
    visibility::{HorizonBuffer, VisibilityQuadtree},
};
use bevy::prelude::*;
use std::time::Instant;

/// Builds the per-(terrain, view) quadtrees for every pair that opted in
/// with a view config. Construction samples the height source extensively,
/// so it runs once and the result is kept for the lifetime of the pair.
pub(crate) fn initialize_terrain_views(
    mut view_configs: ResMut<TerrainViewComponents<TerrainViewConfig>>,
    mut visibility_trees: ResMut<TerrainViewComponents<VisibilityQuadtree>>,
    mut lod_trees: ResMut<TerrainViewComponents<LodQuadtree>>,
    mut horizons: ResMut<TerrainViewComponents<HorizonBuffer>>,
    mut meshes: ResMut<TerrainViewComponents<TerrainMesh>>,
    terrain_query: Query<(Entity, &TerrainConfig, &TerrainHeightField), With<Terrain>>,
    view_query: Query<Entity, With<TerrainView>>,
) {
    for (terrain, config, height_field) in &terrain_query {
        for view in &view_query {
            let key = (terrain, view);
            if visibility_trees.contains_key(&key) || !view_configs.contains_key(&key) {
                continue;
            }

            let view_config = view_configs.get(&key).unwrap().clone();
            if let Err(error) = config.validate().and_then(|_| view_config.validate()) {
                error!("terrain setup for {key:?} aborted: {error:#}");
                view_configs.remove(&key);
                continue;
            }

            let start = Instant::now();
            let source = height_field.source();
            visibility_trees.insert(key, VisibilityQuadtree::new(config, &view_config, source));
            lod_trees.insert(key, LodQuadtree::new(config, &view_config, source));
            horizons.insert(key, HorizonBuffer::new(view_config.horizon_resolution));
            meshes.insert(key, TerrainMesh::default());

            info!(
                "built the terrain quadtrees for {key:?} in {:?}",
                start.elapsed()
            );
        }
    }
}

/// Runs the occlusion pass for every initialized pair, drawing a fresh stamp
/// each time so passes never interfere.
pub(crate) fn compute_visibility(
    mut counter: ResMut<FrameCounter>,
    mut stamps: ResMut<TerrainViewComponents<FrameStamp>>,
    mut visibility_trees: ResMut<TerrainViewComponents<VisibilityQuadtree>>,
    mut horizons: ResMut<TerrainViewComponents<HorizonBuffer>>,
    terrain_query: Query<(Entity, &GlobalTransform), With<Terrain>>,
    view_query: Query<(Entity, &GlobalTransform), With<TerrainView>>,
    debug: Option<Res<DebugTerrain>>,
) {
    if debug.as_ref().is_some_and(|debug| debug.freeze) {
        return;
    }

    for (terrain, terrain_transform) in &terrain_query {
        for (view, view_transform) in &view_query {
            let key = (terrain, view);
            let Some(tree) = visibility_trees.get_mut(&key) else {
                continue;
            };
            let horizon = horizons.get_mut(&key).unwrap();

            let stamp = counter.next();
            stamps.insert(key, stamp);

            if debug.as_ref().is_some_and(|debug| debug.disable_culling) {
                tree.mark_all_visible(stamp);
                continue;
            }

            let view_position = terrain_transform
                .affine()
                .inverse()
                .transform_point3(view_transform.translation());

            tree.compute_visibility(stamp, view_position, horizon);
        }
    }
}

/// Decides the subdivision of every visible block. Must run after the
/// visibility pass of the same frame, it reads the marks of that stamp.
pub(crate) fn compute_lod(
    stamps: Res<TerrainViewComponents<FrameStamp>>,
    visibility_trees: Res<TerrainViewComponents<VisibilityQuadtree>>,
    mut lod_trees: ResMut<TerrainViewComponents<LodQuadtree>>,
    terrain_query: Query<(Entity, &GlobalTransform), With<Terrain>>,
    view_query: Query<(Entity, &GlobalTransform), With<TerrainView>>,
    debug: Option<Res<DebugTerrain>>,
) {
    if debug.is_some_and(|debug| debug.freeze) {
        return;
    }

    for (terrain, terrain_transform) in &terrain_query {
        for (view, view_transform) in &view_query {
            let key = (terrain, view);
            let Some(lod_tree) = lod_trees.get_mut(&key) else {
                continue;
            };
            let visibility = visibility_trees.get(&key).unwrap();
            let stamp = *stamps.get(&key).unwrap();

            let view_position = terrain_transform
                .affine()
                .inverse()
                .transform_point3(view_transform.translation());

            lod_tree.compute_lod(stamp, view_position, visibility);
        }
    }
}

/// Emits the triangle list for every visible block into the per-view mesh.
/// Runs last; the mesh is what the surrounding renderer draws.
pub(crate) fn triangulate(
    stamps: Res<TerrainViewComponents<FrameStamp>>,
    visibility_trees: Res<TerrainViewComponents<VisibilityQuadtree>>,
    lod_trees: Res<TerrainViewComponents<LodQuadtree>>,
    mut meshes: ResMut<TerrainViewComponents<TerrainMesh>>,
    debug: Option<Res<DebugTerrain>>,
) {
    if debug.as_ref().is_some_and(|debug| debug.freeze) {
        return;
    }

    for (&key, mesh) in meshes.iter_mut() {
        let Some(lod_tree) = lod_trees.get(&key) else {
            continue;
        };
        let visibility = visibility_trees.get(&key).unwrap();
        let stamp = *stamps.get(&key).unwrap();

        mesh.clear();
        lod_tree.triangulate(stamp, visibility, &mut |a, b, c| {
            mesh.push_triangle(a, b, c);
        });

        if debug.as_ref().is_some_and(|debug| debug.show_stats) {
            info!(
                "terrain {key:?}: {} triangles, {} nodes subdivided",
                mesh.triangle_count(),
                lod_tree.subdivided_count(stamp)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use bevy::{asset::AssetPlugin, prelude::*};

    fn terrain_app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default(), TerrainPlugin));
        app
    }

    #[test]
    fn plugin_drives_a_flat_terrain_end_to_end() {
        let mut app = terrain_app();

        let config = TerrainConfig::new(100.0, 0.0, 10.0, 2, 2).unwrap();
        let terrain = app
            .world_mut()
            .spawn(TerrainBundle::new(config, |_: f32, _: f32| 0.0).unwrap())
            .id();
        let view = app
            .world_mut()
            .spawn((
                TerrainView,
                Transform::from_xyz(50.0, 100.0, 50.0),
                GlobalTransform::from(Transform::from_xyz(50.0, 100.0, 50.0)),
            ))
            .id();

        app.world_mut()
            .resource_mut::<TerrainViewComponents<TerrainViewConfig>>()
            .insert((terrain, view), TerrainViewConfig::default());

        app.update();
        app.update();

        let meshes = app.world().resource::<TerrainViewComponents<TerrainMesh>>();
        let mesh = meshes.get(&(terrain, view)).unwrap();

        // Flat field seen from above: every block visible, none subdivided.
        assert_eq!(mesh.triangle_count(), 2 * 16);
    }

    #[test]
    fn invalid_view_config_aborts_the_pair() {
        let mut app = terrain_app();

        let terrain = app
            .world_mut()
            .spawn(TerrainBundle::new(TerrainConfig::default(), |_: f32, _: f32| 0.0).unwrap())
            .id();
        let view = app
            .world_mut()
            .spawn((TerrainView, GlobalTransform::default()))
            .id();

        app.world_mut()
            .resource_mut::<TerrainViewComponents<TerrainViewConfig>>()
            .insert(
                (terrain, view),
                TerrainViewConfig {
                    horizon_resolution: 0,
                    ..default()
                },
            );

        app.update();

        let world = app.world();
        assert!(world
            .resource::<TerrainViewComponents<TerrainViewConfig>>()
            .get(&(terrain, view))
            .is_none());
        assert!(world
            .resource::<TerrainViewComponents<TerrainMesh>>()
            .get(&(terrain, view))
            .is_none());
    }
}
