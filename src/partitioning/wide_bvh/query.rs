use super::tree::{decode_leaf, WideBvh};
use crate::bounding_volume::Aabb;
use smallvec::SmallVec;

const TRAVERSAL_STACK_SIZE: usize = 32;

/// Collects the leaves produced by an overlap query.
pub trait LeafCollector<T> {
    /// Appends one result.
    fn add(&mut self, leaf_index: u32, leaf: &T);
}

impl<T, F: FnMut(u32, &T)> LeafCollector<T> for F {
    #[inline(always)]
    fn add(&mut self, leaf_index: u32, leaf: &T) {
        self(leaf_index, leaf)
    }
}

impl<T> LeafCollector<T> for alloc::vec::Vec<u32> {
    #[inline(always)]
    fn add(&mut self, leaf_index: u32, _: &T) {
        self.push(leaf_index)
    }
}

impl<T, const K: usize> WideBvh<T, K> {
    /// Finds every leaf whose stored box intersects `aabb`, with an explicit
    /// traversal stack.
    ///
    /// `(K - 1) * maximum_depth + 1` stack entries always suffice: each level
    /// of the current spine retains at most `K - 1` unexplored siblings.
    ///
    /// The order in which results reach `results` depends on slot order and is
    /// not part of the contract; [`Self::intersect_aabb_recursive`] yields the
    /// same result set.
    pub fn intersect_aabb(&self, aabb: &Aabb, results: &mut impl LeafCollector<T>) {
        let mut stack: SmallVec<[(u32, u32); TRAVERSAL_STACK_SIZE]> = SmallVec::new();
        stack.reserve((K - 1) * self.maximum_depth() + 1);
        stack.push((0, 0));

        while let Some((level, node_index)) = stack.pop() {
            let node = &self.levels[level as usize].nodes[node_index as usize];
            for i in 0..node.child_count as usize {
                if node.bounds[i].intersects(aabb) {
                    let code = node.children[i];
                    if code >= 0 {
                        stack.push((level + 1, code as u32));
                    } else {
                        let leaf = decode_leaf(code);
                        results.add(leaf, &self.leaves[leaf as usize].object);
                    }
                }
            }
        }
    }

    /// Finds every leaf whose stored box intersects `aabb`, with the
    /// recursive traversal specialized for the fan-out.
    ///
    /// Monomorphization fixes `K`, so the per-slot intersection tests are all
    /// issued before the first descent decision and the scan exits as soon as
    /// the live range ends.
    pub fn intersect_aabb_recursive(&self, aabb: &Aabb, results: &mut impl LeafCollector<T>) {
        self.intersect_recurse(0, 0, aabb, results);
    }

    fn intersect_recurse(
        &self,
        level: usize,
        node_index: usize,
        aabb: &Aabb,
        results: &mut impl LeafCollector<T>,
    ) {
        let node = &self.levels[level].nodes[node_index];
        // Sentinel bounds past the live range never intersect anything.
        let hits: [bool; K] = core::array::from_fn(|i| node.bounds[i].intersects(aabb));

        for i in 0..K {
            if i >= node.child_count as usize {
                break;
            }
            if hits[i] {
                let code = node.children[i];
                if code >= 0 {
                    self.intersect_recurse(level + 1, code as usize, aabb, results);
                } else {
                    let leaf = decode_leaf(code);
                    results.add(leaf, &self.leaves[leaf as usize].object);
                }
            }
        }
    }
}
