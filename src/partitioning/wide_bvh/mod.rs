pub use query::LeafCollector;
pub use tree::{
    BoundedObject, Node, NodeId, WideBvh, WideBvh16, WideBvh2, WideBvh32, WideBvh4, WideBvh8,
    WideBvhDesc,
};
pub use treelet::{SubtreeHeap, SubtreeHeapEntry, SubtreeRef};
pub use validation::TreeIntegrityError;

mod insert;
mod query;
mod refit;
mod tree;
mod treelet;
mod validation;

#[cfg(test)]
mod tests;
