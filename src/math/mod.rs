pub mod aabb;
pub(crate) mod layout;

pub use aabb::{axis_distance, mid, TerrainAabb};
