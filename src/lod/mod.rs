//! Error-driven LOD selection and crack-free triangulation.
//!
//! Every renderable block carries a fixed-depth quadtree whose nodes store a
//! precomputed worst-case interpolation error. Each frame the selection pass
//! stamps the nodes that must subdivide for the current view, and the
//! triangulator walks the same trees, stitching neighbouring regions of
//! different density so no seam ever shows a crack.

pub mod quadtree;
pub mod select;
pub mod triangulate;

pub use quadtree::LodQuadtree;
