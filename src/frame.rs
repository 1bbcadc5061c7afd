use bevy::prelude::*;

/// Identifier of one culling/LOD pass over one terrain and view pair.
///
/// Both quadtrees store stamps instead of boolean flags: a node is visible or
/// subdivided exactly when its stored stamp equals the stamp of the current
/// pass. Resetting all nodes therefore costs nothing, a new stamp invalidates
/// every old mark at once.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct FrameStamp(u64);

impl FrameStamp {
    /// The stamp no pass ever uses. Nodes are initialized with it, so a
    /// freshly built tree is entirely invisible and unsubdivided.
    pub const NEVER: Self = Self(0);
}

/// Source of unique [`FrameStamp`]s, one per pass.
///
/// Every pass over a (terrain, view) pair draws a fresh stamp, so multiple
/// views of the same terrain (cameras, shadow passes) cannot interfere with
/// each other's marks within a frame.
#[derive(Resource, Default)]
pub struct FrameCounter(u64);

impl FrameCounter {
    pub fn next(&mut self) -> FrameStamp {
        self.0 += 1;
        FrameStamp(self.0)
    }
}
