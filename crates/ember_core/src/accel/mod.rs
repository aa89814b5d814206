//! Spatial acceleration: the bounding-volume hierarchy and the structures
//! that drive its construction.

mod bvh;
mod heap;
mod kdtree;

pub use bvh::{Bvh, BvhNode, LeafHit};
pub use heap::Heap;
pub use kdtree::KdTree;
