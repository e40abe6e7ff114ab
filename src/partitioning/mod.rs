//! Spatial partitioning tools.

pub use self::wide_bvh::{
    BoundedObject, LeafCollector, Node, NodeId, SubtreeHeap, SubtreeHeapEntry, SubtreeRef,
    TreeIntegrityError, WideBvh, WideBvh16, WideBvh2, WideBvh32, WideBvh4, WideBvh8, WideBvhDesc,
};

mod wide_bvh;
