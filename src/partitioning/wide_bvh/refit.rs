use super::tree::{BoundedObject, WideBvh};

impl<T: BoundedObject, const K: usize> WideBvh<T, K> {
    /// Recomputes every stored bound from the current leaf boxes.
    ///
    /// Leaf slots are refreshed from their objects first; then each internal
    /// child slot is rebuilt, deepest level first, as the union of the child
    /// node's live slot bounds. The shape of the tree is left untouched, so
    /// a tree degraded by leaf motion stays degraded until a refinement pass
    /// rebuilds part of it (see [`WideBvh::collect_subtrees`]).
    pub fn refit(&mut self) {
        for leaf in 0..self.leaves.len() {
            let record = &self.leaves[leaf];
            let aabb = record.object.bounding_box();
            let (level, node, child) = (
                record.level as usize,
                record.node as usize,
                record.child as usize,
            );
            self.levels[level].nodes[node].bounds[child] = aabb;
        }

        for depth in (0..self.maximum_depth).rev() {
            let (upper, lower) = self.levels.split_at_mut(depth + 1);
            let level = &mut upper[depth];
            let child_level = &lower[0];

            for node in level.nodes.iter_mut() {
                for child in 0..node.child_count as usize {
                    let code = node.children[child];
                    if code >= 0 {
                        let child_node = &child_level.nodes[code as usize];
                        let mut bounds = child_node.bounds[0];
                        for grandchild in 1..child_node.child_count as usize {
                            bounds.merge(&child_node.bounds[grandchild]);
                        }
                        node.bounds[child] = bounds;
                    }
                }
            }
        }
    }
}
