use super::tree::{NodeId, WideBvh};
use crate::math::Real;
use crate::utils::{BufferPool, QuickList};
use ordered_float::OrderedFloat;

/// One boundary candidate tracked by [`SubtreeHeap`].
#[derive(Copy, Clone, Debug)]
pub struct SubtreeHeapEntry {
    /// The node whose subtree sits on the treelet boundary.
    pub node: NodeId,
    /// Surface-area metric of the bounds its parent stores for it.
    pub cost: OrderedFloat<Real>,
}

impl Default for SubtreeHeapEntry {
    fn default() -> Self {
        Self {
            node: NodeId::default(),
            cost: OrderedFloat(0.0),
        }
    }
}

/// A binary max-heap living in a caller-provided scratch buffer.
///
/// The treelet collector pops its highest-cost boundary candidate from here;
/// keeping the storage caller-owned keeps the hot refinement path free of
/// allocations.
pub struct SubtreeHeap<'a> {
    entries: &'a mut [SubtreeHeapEntry],
    len: usize,
}

impl<'a> SubtreeHeap<'a> {
    /// Wraps `scratch` as an empty heap.
    pub fn new(scratch: &'a mut [SubtreeHeapEntry]) -> Self {
        Self {
            entries: scratch,
            len: 0,
        }
    }

    /// The number of queued entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the heap empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Queues an entry. Panics if the scratch buffer is already full.
    pub fn insert(&mut self, entry: SubtreeHeapEntry) {
        assert!(
            self.len < self.entries.len(),
            "subtree heap scratch buffer overflow"
        );
        let mut child = self.len;
        self.entries[child] = entry;
        self.len += 1;

        while child > 0 {
            let parent = (child - 1) >> 1;
            if self.entries[parent].cost < self.entries[child].cost {
                self.entries.swap(parent, child);
                child = parent;
            } else {
                break;
            }
        }
    }

    /// Removes and returns the highest-cost entry.
    pub fn pop(&mut self) -> Option<SubtreeHeapEntry> {
        if self.len == 0 {
            return None;
        }
        let top = self.entries[0];
        self.len -= 1;
        self.entries[0] = self.entries[self.len];

        let mut parent = 0;
        loop {
            let left = parent * 2 + 1;
            if left >= self.len {
                break;
            }
            let mut largest = left;
            let right = left + 1;
            if right < self.len && self.entries[right].cost > self.entries[left].cost {
                largest = right;
            }
            if self.entries[largest].cost > self.entries[parent].cost {
                self.entries.swap(largest, parent);
                parent = largest;
            } else {
                break;
            }
        }
        Some(top)
    }
}

/// One boundary element of a collected treelet.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SubtreeRef {
    /// Depth of the node arena the `child` code points into. Only meaningful
    /// when the code is non-negative; an encoded leaf carries its own identity.
    pub level: u32,
    /// Child code: a non-negative node index at `level`, or an encoded leaf.
    pub child: i32,
}

impl SubtreeRef {
    /// Does this boundary element reference a whole node rather than a leaf?
    #[inline]
    pub fn is_node(&self) -> bool {
        self.child >= 0
    }
}

impl<T, const K: usize> WideBvh<T, K> {
    /// Collects a connected region rooted at the internal node `root` for
    /// later rebalancing.
    ///
    /// The boundary starts as `root`'s children and repeatedly expands its
    /// highest-cost node while the expansion still fits within `max_subtrees`
    /// boundary entries. On return, `subtrees` holds the boundary (leaf codes
    /// and unexpanded nodes), `internal_nodes` holds the expanded interior
    /// with `root` moved to the last slot so a refinement pass can pop it as
    /// the first node to reuse, and the returned value is the accumulated
    /// surface-area cost of the expanded interior.
    ///
    /// `heap_scratch` must hold at least `max_subtrees` entries. Panics if
    /// `max_subtrees` is smaller than the root's child count.
    #[allow(clippy::too_many_arguments)]
    pub fn collect_subtrees(
        &self,
        root: NodeId,
        max_subtrees: usize,
        heap_scratch: &mut [SubtreeHeapEntry],
        subtrees: &mut QuickList<SubtreeRef>,
        subtree_pool: &mut BufferPool<SubtreeRef>,
        internal_nodes: &mut QuickList<NodeId>,
        node_pool: &mut BufferPool<NodeId>,
    ) -> Real {
        let root_node = self.node(root);
        assert!(
            max_subtrees >= root_node.child_count(),
            "treelet budget below the root's fan-out"
        );

        let mut heap = SubtreeHeap::new(heap_scratch);
        self.push_children(root, subtrees, subtree_pool, &mut heap);

        let root_slot = internal_nodes.len();
        internal_nodes.add(root, node_pool);

        // Every expansion trades one boundary entry for `child_count` new
        // ones, so the budget decreases by `child_count - 1` per expansion.
        let mut remaining = max_subtrees - root_node.child_count();
        let mut treelet_cost = 0.0;

        while let Some(entry) = heap.pop() {
            let node = self.node(entry.node);
            let expansion = node.child_count() - 1;
            if remaining >= expansion {
                treelet_cost += entry.cost.into_inner();
                internal_nodes.add(entry.node, node_pool);
                remaining -= expansion;
                self.push_children(entry.node, subtrees, subtree_pool, &mut heap);
            } else {
                // Too wide to expand under the remaining budget; it stays on
                // the boundary as a whole subtree.
                subtrees.add(
                    SubtreeRef {
                        level: entry.node.level,
                        child: entry.node.node as i32,
                    },
                    subtree_pool,
                );
                if remaining == 0 {
                    break;
                }
            }
        }

        // Whatever is still queued was never expanded: it belongs to the boundary.
        while let Some(entry) = heap.pop() {
            subtrees.add(
                SubtreeRef {
                    level: entry.node.level,
                    child: entry.node.node as i32,
                },
                subtree_pool,
            );
        }

        let last = internal_nodes.len() - 1;
        internal_nodes.swap(root_slot, last);

        treelet_cost
    }

    fn push_children(
        &self,
        id: NodeId,
        subtrees: &mut QuickList<SubtreeRef>,
        subtree_pool: &mut BufferPool<SubtreeRef>,
        heap: &mut SubtreeHeap<'_>,
    ) {
        let node = self.node(id);
        for i in 0..node.child_count() {
            let code = node.child_code(i);
            if code >= 0 {
                heap.insert(SubtreeHeapEntry {
                    node: NodeId::new(id.level + 1, code as u32),
                    cost: OrderedFloat(node.child_bounds(i).surface_area()),
                });
            } else {
                subtrees.add(
                    SubtreeRef {
                        level: id.level + 1,
                        child: code,
                    },
                    subtree_pool,
                );
            }
        }
    }
}
