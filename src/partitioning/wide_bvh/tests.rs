use super::tree::decode_leaf;
use crate::bounding_volume::Aabb;
use crate::math::{Point, Real, Vector};
use crate::partitioning::{
    NodeId, SubtreeHeap, SubtreeHeapEntry, SubtreeRef, WideBvh, WideBvhDesc,
};
use crate::utils::{pool_index, BufferPool, QuickList};
use alloc::vec::Vec;
use ordered_float::OrderedFloat;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn make_test_aabb(i: usize) -> Aabb {
    Aabb::from_half_extents(Vector::repeat(i as Real).into(), Vector::repeat(1.0))
}

fn unit_aabb_at(x: Real, y: Real, z: Real) -> Aabb {
    Aabb::from_half_extents(Point::new(x, y, z), Vector::repeat(0.5))
}

fn grid_aabb(i: usize) -> Aabb {
    unit_aabb_at(
        (i % 4) as Real * 4.0,
        ((i / 4) % 4) as Real * 4.0,
        (i / 16) as Real * 4.0,
    )
}

fn translated(aabb: &Aabb, shift: Vector<Real>) -> Aabb {
    Aabb::new(aabb.mins + shift, aabb.maxs + shift)
}

fn random_aabb(rng: &mut StdRng) -> Aabb {
    let mins = Point::new(
        rng.gen_range(-100.0..100.0),
        rng.gen_range(-100.0..100.0),
        rng.gen_range(-100.0..100.0),
    );
    let extents = Vector::new(
        rng.gen_range(0.1..10.0),
        rng.gen_range(0.1..10.0),
        rng.gen_range(0.1..10.0),
    );
    Aabb::new(mins, mins + extents)
}

/// Gathers every leaf reachable from the subtree rooted at `id`.
fn leaves_under<const K: usize>(tree: &WideBvh<Aabb, K>, id: NodeId, out: &mut Vec<u32>) {
    let node = tree.node(id);
    for i in 0..node.child_count() {
        let code = node.child_code(i);
        if code >= 0 {
            leaves_under(tree, NodeId::new(id.level + 1, code as u32), out);
        } else {
            out.push(node.child_leaf(i));
        }
    }
}

/// Checks that every stored bound is exactly the union of the leaf boxes
/// reachable through it. Only holds right after a refit (or while nothing moved).
fn assert_tight_bounds<const K: usize>(tree: &WideBvh<Aabb, K>) {
    for depth in 0..=tree.maximum_depth() {
        for n in 0..tree.levels[depth].len() {
            let id = NodeId::new(depth as u32, n as u32);
            let node = tree.node(id);
            for i in 0..node.child_count() {
                let code = node.child_code(i);
                let expected = if code >= 0 {
                    let mut reachable = Vec::new();
                    leaves_under(tree, NodeId::new(id.level + 1, code as u32), &mut reachable);
                    let mut union = Aabb::new_invalid();
                    for leaf in reachable {
                        union.merge(tree.leaf(leaf));
                    }
                    union
                } else {
                    *tree.leaf(node.child_leaf(i))
                };
                assert_eq!(*node.child_bounds(i), expected);
            }
        }
    }
}

fn tree_shape<const K: usize>(tree: &WideBvh<Aabb, K>) -> Vec<Vec<(u32, Vec<i32>)>> {
    tree.levels
        .iter()
        .map(|level| {
            level
                .nodes
                .iter()
                .map(|node| (node.child_count, node.children.to_vec()))
                .collect()
        })
        .collect()
}

#[test]
fn aabb_metrics() {
    let aabb = Aabb::new(Point::new(0.0, 0.0, 0.0), Point::new(2.0, 3.0, 4.0));
    assert_relative_eq!(aabb.volume(), 24.0);
    assert_relative_eq!(aabb.surface_area(), 52.0);
    assert_eq!(aabb.center(), Point::new(1.0, 1.5, 2.0));

    let other = unit_aabb_at(2.0, 3.0, 4.0);
    assert!(aabb.intersects(&other));
    assert!(!aabb.intersects(&unit_aabb_at(10.0, 0.0, 0.0)));

    let merged = aabb.merged(&unit_aabb_at(10.0, 0.0, 0.0));
    assert_eq!(merged.maxs.x, 10.5);
    assert!(merged.contains(&aabb));

    // Merging anything into the invalid sentinel yields that thing.
    assert_eq!(Aabb::new_invalid().merged(&aabb), aabb);
    assert!(Aabb::new_invalid().volume() < 0.0);
}

#[test]
fn first_insert_fills_root_slot_zero() {
    let mut tree: WideBvh<Aabb, 4> = WideBvh::new();
    assert!(tree.is_empty());

    let leaf = tree.insert(Aabb::new(Point::origin(), Point::new(1.0, 1.0, 1.0)));
    assert_eq!(leaf, 0);
    assert_eq!(tree.leaf_count(), 1);

    let root = tree.node(NodeId::ROOT);
    assert_eq!(root.child_count(), 1);
    assert_eq!(root.child_code(0), -2);
    assert_eq!(
        *root.child_bounds(0),
        Aabb::new(Point::origin(), Point::new(1.0, 1.0, 1.0))
    );
    assert_eq!(tree.leaf_owner(0), (NodeId::ROOT, 0));
    tree.assert_well_formed();
}

#[test]
fn fill_root_then_split() {
    let mut tree: WideBvh<Aabb, 2> = WideBvh::new();
    let _ = tree.insert(unit_aabb_at(0.0, 0.0, 0.0));
    let _ = tree.insert(unit_aabb_at(10.0, 0.0, 0.0));
    let _ = tree.insert(unit_aabb_at(0.0, 10.0, 0.0));
    let _ = tree.insert(unit_aabb_at(10.0, 10.0, 0.0));
    tree.assert_well_formed();

    // Both root slots split: the near pair and the far pair each share a
    // depth-1 node.
    let root = tree.node(NodeId::ROOT);
    assert_eq!(root.child_count(), 2);
    assert_eq!(tree.maximum_depth(), 1);
    assert_eq!(tree.levels[1].len(), 2);
    for n in 0..2 {
        assert_eq!(tree.node(NodeId::new(1, n)).child_count(), 2);
    }

    let mut reachable = Vec::new();
    leaves_under(&tree, NodeId::ROOT, &mut reachable);
    reachable.sort_unstable();
    assert_eq!(reachable, alloc::vec![0, 1, 2, 3]);

    for leaf in 0..4u32 {
        let mut hits: Vec<u32> = Vec::new();
        tree.intersect_aabb(&tree.leaf_aabb(leaf), &mut hits);
        assert!(hits.contains(&leaf));
    }
}

#[test]
fn refit_preserves_shape_and_tightens_bounds() {
    let mut tree: WideBvh<Aabb, 2> = WideBvh::new();
    for i in 0..4 {
        let _ = tree.insert(unit_aabb_at(
            (i % 2) as Real * 10.0,
            (i / 2) as Real * 10.0,
            0.0,
        ));
    }

    let shape = tree_shape(&tree);
    tree.refit();
    assert_eq!(tree_shape(&tree), shape);
    tree.assert_well_formed();
    assert_tight_bounds(&tree);
}

#[test]
fn refit_follows_leaf_motion() {
    let mut tree: WideBvh<Aabb, 2> = WideBvh::new();
    let _ = tree.insert(unit_aabb_at(0.0, 0.0, 0.0));
    let _ = tree.insert(unit_aabb_at(10.0, 0.0, 0.0));
    let _ = tree.insert(unit_aabb_at(0.0, 10.0, 0.0));
    let _ = tree.insert(unit_aabb_at(10.0, 10.0, 0.0));

    let moved = translated(tree.leaf(2), Vector::new(100.0, 0.0, 0.0));
    *tree.leaf_mut(2) = moved;
    tree.refit();
    tree.assert_well_formed();
    assert_tight_bounds(&tree);

    // Only the moved leaf lives around its new position.
    let mut hits: Vec<u32> = Vec::new();
    tree.intersect_aabb(
        &Aabb::new(Point::new(99.0, 9.0, -1.0), Point::new(101.0, 11.0, 1.0)),
        &mut hits,
    );
    assert_eq!(hits, alloc::vec![2]);

    // And its old neighborhood no longer reports it.
    let mut hits: Vec<u32> = Vec::new();
    tree.intersect_aabb(
        &Aabb::new(Point::new(-1.0, 9.0, -1.0), Point::new(1.0, 11.0, 1.0)),
        &mut hits,
    );
    assert!(!hits.contains(&2));
}

#[test]
fn incremental_inserts_stay_well_formed() {
    fn check<const K: usize>(desc: WideBvhDesc) {
        for len in 1..=60 {
            let mut tree: WideBvh<Aabb, K> = WideBvh::with_desc(desc);
            for i in 0..len {
                let leaf = tree.insert(make_test_aabb(i));
                assert_eq!(leaf, i as u32);
                tree.assert_well_formed();
            }

            // Every inserted box finds its own leaf again.
            for i in 0..len {
                let mut hits: Vec<u32> = Vec::new();
                tree.intersect_aabb(&make_test_aabb(i), &mut hits);
                assert!(hits.contains(&(i as u32)));

                let mut recursive_hits: Vec<u32> = Vec::new();
                tree.intersect_aabb_recursive(&make_test_aabb(i), &mut recursive_hits);
                assert!(recursive_hits.contains(&(i as u32)));
            }
        }
    }

    let tiny = WideBvhDesc {
        initial_leaf_capacity: 1,
        initial_tree_depth: 1,
    };
    check::<2>(WideBvhDesc::default());
    check::<2>(tiny);
    check::<4>(WideBvhDesc::default());
    check::<4>(tiny);
    check::<8>(tiny);
}

#[test]
fn queries_agree_with_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe_f00d);
    let mut tree: WideBvh<Aabb, 4> = WideBvh::new();
    let mut boxes = Vec::new();

    for _ in 0..200 {
        let aabb = random_aabb(&mut rng);
        boxes.push(aabb);
        let _ = tree.insert(aabb);
    }
    tree.assert_well_formed();

    let check_queries = |tree: &WideBvh<Aabb, 4>, boxes: &[Aabb], rng: &mut StdRng| {
        for _ in 0..50 {
            let query = random_aabb(rng);

            let mut expected: Vec<u32> = boxes
                .iter()
                .enumerate()
                .filter(|(_, aabb)| aabb.intersects(&query))
                .map(|(i, _)| i as u32)
                .collect();
            expected.sort_unstable();

            let mut stack_hits: Vec<u32> = Vec::new();
            tree.intersect_aabb(&query, &mut stack_hits);
            stack_hits.sort_unstable();
            assert_eq!(stack_hits, expected);

            let mut recursive_hits: Vec<u32> = Vec::new();
            tree.intersect_aabb_recursive(&query, &mut recursive_hits);
            recursive_hits.sort_unstable();
            assert_eq!(recursive_hits, expected);
        }
    };

    check_queries(&tree, &boxes, &mut rng);

    // Move half of the leaves, refit, and the same agreement must hold.
    for _ in 0..100 {
        let leaf = rng.gen_range(0..boxes.len());
        let shift = Vector::new(
            rng.gen_range(-50.0..50.0),
            rng.gen_range(-50.0..50.0),
            rng.gen_range(-50.0..50.0),
        );
        let moved = translated(&boxes[leaf], shift);
        boxes[leaf] = moved;
        *tree.leaf_mut(leaf as u32) = moved;
    }
    tree.refit();
    tree.assert_well_formed();
    assert_tight_bounds(&tree);

    check_queries(&tree, &boxes, &mut rng);
}

#[test]
fn query_on_empty_tree_returns_nothing() {
    let tree: WideBvh<Aabb, 8> = WideBvh::new();
    let mut hits: Vec<u32> = Vec::new();
    tree.intersect_aabb(&make_test_aabb(0), &mut hits);
    assert!(hits.is_empty());

    let root_aabb = tree.root_aabb();
    assert!(root_aabb.mins.x > root_aabb.maxs.x);
}

#[test]
fn closure_collector_observes_payloads() {
    let mut tree: WideBvh<Aabb, 4> = WideBvh::new();
    for i in 0..8 {
        let _ = tree.insert(make_test_aabb(i));
    }

    let mut volumes = 0.0;
    tree.intersect_aabb(&make_test_aabb(3), &mut |_, leaf: &Aabb| {
        volumes += leaf.volume();
    });
    assert!(volumes > 0.0);
}

#[test]
fn pool_index_is_ceil_log2() {
    assert_eq!(pool_index(0), 0);
    assert_eq!(pool_index(1), 0);
    for p in 0..=30 {
        assert_eq!(pool_index(1usize << p), p);
    }
    for p in 0..30 {
        assert_eq!(pool_index((1usize << p) + 1), p + 1);
    }
}

#[test]
fn buffer_pool_reuses_latest_returned_buffer() {
    let mut pool: BufferPool<u32> = BufferPool::new();

    let buffer = pool.take(5);
    assert_eq!(buffer.len(), 32);
    let ptr = buffer.as_ptr();
    pool.return_buffer(buffer, 5);

    let again = pool.take(5);
    assert_eq!(again.as_ptr(), ptr);
    pool.return_buffer(again, 5);

    pool.ensure_count(3, 4);
    assert_eq!(pool.cached_count(3), 4);

    pool.clear();
    assert_eq!(pool.cached_count(3), 0);
    assert_eq!(pool.cached_count(5), 0);
}

#[test]
fn quick_list_grows_through_the_pool() {
    let mut pool: BufferPool<u32> = BufferPool::new();
    let mut list = QuickList::with_capacity(2, &mut pool);

    for i in 0..40u32 {
        list.add(i, &mut pool);
    }
    assert_eq!(list.len(), 40);
    for i in 0..40u32 {
        assert_eq!(list[i as usize], i);
    }

    // Every outgrown buffer went back to its stack.
    assert_eq!(pool.cached_count(1), 1);
    assert_eq!(pool.cached_count(2), 1);
    assert_eq!(pool.cached_count(5), 1);

    list.swap(0, 39);
    assert_eq!(list[0], 39);
    assert_eq!(list[39], 0);

    list.dispose(&mut pool);
    assert_eq!(pool.cached_count(6), 1);
}

#[test]
fn subtree_heap_pops_in_non_increasing_cost_order() {
    let mut rng = StdRng::seed_from_u64(0xbe57_c057);
    let mut scratch = alloc::vec![SubtreeHeapEntry::default(); 128];
    let mut heap = SubtreeHeap::new(&mut scratch);

    for i in 0..128u32 {
        heap.insert(SubtreeHeapEntry {
            node: NodeId::new(0, i),
            cost: OrderedFloat(rng.gen_range(0.0..100.0)),
        });
    }
    assert_eq!(heap.len(), 128);

    let mut previous = Real::MAX;
    while let Some(entry) = heap.pop() {
        assert!(entry.cost.into_inner() <= previous);
        previous = entry.cost.into_inner();
    }
    assert!(heap.is_empty());
}

#[test]
fn treelet_collection_covers_the_root_subtree() {
    let mut tree: WideBvh<Aabb, 4> = WideBvh::new();
    for i in 0..32 {
        let _ = tree.insert(grid_aabb(i));
    }
    tree.assert_well_formed();
    assert!(tree.maximum_depth() >= 1);

    let mut subtree_pool: BufferPool<SubtreeRef> = BufferPool::new();
    let mut node_pool: BufferPool<NodeId> = BufferPool::new();
    let mut subtrees = QuickList::with_capacity(8, &mut subtree_pool);
    let mut internal_nodes = QuickList::with_capacity(8, &mut node_pool);
    let mut scratch = alloc::vec![SubtreeHeapEntry::default(); 8];

    let cost = tree.collect_subtrees(
        NodeId::ROOT,
        8,
        &mut scratch,
        &mut subtrees,
        &mut subtree_pool,
        &mut internal_nodes,
        &mut node_pool,
    );

    // The root always expands at least one child under this budget.
    assert!(cost > 0.0);
    assert!(internal_nodes.len() >= 2);
    assert!(subtrees.len() <= 8);
    assert_eq!(internal_nodes[internal_nodes.len() - 1], NodeId::ROOT);

    // The boundary covers the whole subtree, each leaf through exactly one entry.
    let mut covered: Vec<u32> = Vec::new();
    for subtree in subtrees.as_slice() {
        if subtree.is_node() {
            leaves_under(
                &tree,
                NodeId::new(subtree.level, subtree.child as u32),
                &mut covered,
            );
        } else {
            covered.push(decode_leaf(subtree.child));
        }
    }
    covered.sort_unstable();
    let expected: Vec<u32> = (0..32).collect();
    assert_eq!(covered, expected);

    subtrees.dispose(&mut subtree_pool);
    internal_nodes.dispose(&mut node_pool);
}

#[test]
#[should_panic]
fn treelet_budget_below_root_fan_out_is_rejected() {
    let mut tree: WideBvh<Aabb, 4> = WideBvh::new();
    for i in 0..8 {
        let _ = tree.insert(make_test_aabb(i));
    }

    let mut subtree_pool: BufferPool<SubtreeRef> = BufferPool::new();
    let mut node_pool: BufferPool<NodeId> = BufferPool::new();
    let mut subtrees = QuickList::with_capacity(2, &mut subtree_pool);
    let mut internal_nodes = QuickList::with_capacity(2, &mut node_pool);
    let mut scratch = alloc::vec![SubtreeHeapEntry::default(); 2];

    let _ = tree.collect_subtrees(
        NodeId::ROOT,
        2,
        &mut scratch,
        &mut subtrees,
        &mut subtree_pool,
        &mut internal_nodes,
        &mut node_pool,
    );
}

#[test]
#[should_panic]
fn zero_leaf_capacity_is_rejected() {
    let _ = WideBvh::<Aabb, 4>::with_desc(WideBvhDesc {
        initial_leaf_capacity: 0,
        initial_tree_depth: 8,
    });
}

#[test]
#[should_panic]
fn zero_tree_depth_is_rejected() {
    let _ = WideBvh::<Aabb, 4>::with_desc(WideBvhDesc {
        initial_leaf_capacity: 4096,
        initial_tree_depth: 0,
    });
}
