//! Horizon-buffer occlusion culling.
//!
//! A static quadtree stores the height extrema of every region of the
//! terrain. Each frame the tree is walked front to back from the view
//! position; every visible region raises an angular horizon, and regions
//! whose highest possible elevation angle stays below that horizon are
//! skipped together with their entire subtree.

pub mod horizon;
pub mod quadtree;
pub(crate) mod sector;

pub use horizon::{HorizonBuffer, SectorRange};
pub use quadtree::VisibilityQuadtree;
