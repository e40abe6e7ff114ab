use super::tree::{decode_leaf, encode_leaf, BoundedObject, LeafRecord, Node, WideBvh, EMPTY_SLOT};
use crate::math::Real;

impl<T: BoundedObject, const K: usize> WideBvh<T, K> {
    /// Inserts `object` as a new leaf and returns the index identifying it.
    ///
    /// The insertion walks down from the root. At each node it scans the live
    /// slots plus the first free one, picks the slot whose bounds grow the
    /// least when merged with the new box, and then either fills a free slot,
    /// splits a leaf slot into a fresh node one level deeper, or descends
    /// into an internal child. A full node always routes into an existing
    /// child, so the tree grows deeper rather than wider.
    pub fn insert(&mut self, object: T) -> u32 {
        let aabb = object.bounding_box();
        let new_leaf = self.leaves.len() as u32;
        let encoded = encode_leaf(new_leaf);

        let mut level_index = 0usize;
        let mut node_index = 0usize;

        loop {
            let node = &self.levels[level_index].nodes[node_index];
            let child_count = node.child_count as usize;
            let slots = K.min(child_count + 1);

            let mut best_slot = 0usize;
            let mut best_change = Real::MAX;
            let mut best_merged = aabb;
            for i in 0..slots {
                // The invalid sentinel has a negative volume; growing from it
                // costs the full volume of the merged box.
                let old_volume = node.bounds[i].volume().max(0.0);
                let merged = node.bounds[i].merged(&aabb);
                let change = merged.volume() - old_volume;
                if change < best_change {
                    best_change = change;
                    best_slot = i;
                    best_merged = merged;
                }
            }

            let code = node.children[best_slot];
            let old_bounds = node.bounds[best_slot];

            if code <= -2 {
                // The slot holds a leaf: split it into a node one level
                // deeper carrying the old leaf and the new one.
                let old_leaf = decode_leaf(code);
                self.ensure_level(level_index + 1);

                let mut split = Node::empty();
                split.child_count = 2;
                split.bounds[0] = old_bounds;
                split.children[0] = code;
                split.bounds[1] = aabb;
                split.children[1] = encoded;
                let split_index = self.levels[level_index + 1].add(split);

                self.leaves.push(LeafRecord {
                    object,
                    level: (level_index + 1) as u32,
                    node: split_index,
                    child: 1,
                });
                let moved = &mut self.leaves[old_leaf as usize];
                moved.level = (level_index + 1) as u32;
                moved.node = split_index;
                moved.child = 0;

                let node = &mut self.levels[level_index].nodes[node_index];
                node.children[best_slot] = split_index as i32;
                node.bounds[best_slot] = best_merged;
                return new_leaf;
            } else if code == EMPTY_SLOT {
                // The bounded scan only ever reaches the one trailing free slot.
                debug_assert_eq!(best_slot, child_count);

                let node = &mut self.levels[level_index].nodes[node_index];
                node.child_count += 1;
                node.children[best_slot] = encoded;
                node.bounds[best_slot] = best_merged;
                self.leaves.push(LeafRecord {
                    object,
                    level: level_index as u32,
                    node: node_index as u32,
                    child: best_slot as u32,
                });
                return new_leaf;
            } else {
                // Internal child: widen its bound and keep descending.
                let node = &mut self.levels[level_index].nodes[node_index];
                node.bounds[best_slot] = best_merged;
                level_index += 1;
                node_index = code as usize;
            }
        }
    }
}
