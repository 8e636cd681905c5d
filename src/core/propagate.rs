//! Derived per-node quantities: height, covered line numbers, size, and the
//! structural hashes used to bucket statements before clustering.
//!
//! Arena nodes are immutable, so none of these are stored on the node
//! itself; they are computed in a single iterative post-order pass and
//! handed back as side tables keyed by [`NodeId`]. Traversal is iterative
//! (an explicit stack) rather than recursive, so a deeply nested expression
//! doesn't risk blowing the call stack.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};

use ahash::AHasher;

use crate::antiunify::substitution::FREE_VARIABLE_COST;
use crate::core::arena::{Arena, NodeId, NodeKind};

/// Height and covered-line-number tables for every node reachable from a
/// set of roots.
#[derive(Debug, Default)]
pub struct Propagated {
    heights: HashMap<NodeId, u32>,
    covered_lines: HashMap<NodeId, BTreeSet<u32>>,
}

impl Propagated {
    /// The height of `id` (0 for a leaf, 1 + max child height otherwise).
    /// Panics if `id` was not reachable from any root passed to
    /// [`propagate`].
    pub fn height(&self, id: NodeId) -> u32 {
        self.heights[&id]
    }

    /// The set of source lines covered by `id`'s subtree.
    pub fn covered_lines(&self, id: NodeId) -> &BTreeSet<u32> {
        &self.covered_lines[&id]
    }
}

/// Compute height and covered-line tables for every node reachable from
/// `roots`, in one iterative post-order pass per root.
pub fn propagate(arena: &Arena, roots: &[NodeId]) -> Propagated {
    let mut result = Propagated::default();
    for &root in roots {
        for id in post_order(arena, root) {
            if result.heights.contains_key(&id) {
                continue;
            }
            let node = arena.node(id);
            let mut height = 0u32;
            let mut lines: BTreeSet<u32> = BTreeSet::new();
            if node.line != 0 {
                lines.insert(node.line);
            }
            for &child in &node.children {
                if let Some(&child_height) = result.heights.get(&child) {
                    height = height.max(child_height + 1);
                }
                if let Some(child_lines) = result.covered_lines.get(&child) {
                    lines.extend(child_lines.iter().copied());
                }
            }
            result.heights.insert(id, height);
            result.covered_lines.insert(id, lines);
        }
    }
    result
}

/// Iterative post-order traversal of the subtree rooted at `root`. Visits a
/// shared node once per occurrence in the tree shape, not once per unique
/// handle, so callers that memoize by `NodeId` (as [`propagate`] does) get
/// each node's dependencies computed before it is used.
fn post_order(arena: &Arena, root: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        stack.push((id, true));
        for &child in arena.node(id).children.iter().rev() {
            stack.push((child, false));
        }
    }
    order
}

/// Number of distinct source lines covered by the subtree rooted at `root`.
pub fn covered_line_count(arena: &Arena, root: NodeId) -> usize {
    propagate(arena, &[root]).covered_lines(root).len()
}

/// Size of the subtree rooted at `root`: the count of distinct node
/// identities reachable from it, each counted once no matter how many
/// parents point at it (the "shared leaves" rule from the data model).
/// `Empty` nodes are excluded unless `ignore_none` is false. A
/// `FreeVariable` leaf contributes [`FREE_VARIABLE_COST`] (0.5) rather than
/// the usual 1.0, per §3's size invariant.
pub fn size(arena: &Arena, root: NodeId, ignore_none: bool) -> f64 {
    let mut observed = HashSet::new();
    size_with_observed(arena, root, ignore_none, &mut observed)
}

/// Like [`size`], but dedupes against a caller-supplied identity set that
/// may already contain nodes from a sibling subtree — used by the
/// anti-unifier to size a substitution's values without double-counting a
/// leaf shared between two of them.
pub fn size_with_observed(
    arena: &Arena,
    root: NodeId,
    ignore_none: bool,
    observed: &mut HashSet<NodeId>,
) -> f64 {
    let mut total = 0.0;
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !observed.insert(id) {
            continue;
        }
        let node = arena.node(id);
        if matches!(node.kind, NodeKind::Empty) && ignore_none {
            continue;
        }
        total += match node.kind {
            NodeKind::FreeVariable(_) => FREE_VARIABLE_COST,
            _ => 1.0,
        };
        for &child in &node.children {
            stack.push(child);
        }
    }
    total
}

/// Build a parent-pointer side table for every node reachable from `roots`.
/// Arena nodes only store children, so the dominated-clone check (which
/// walks upward from a statement to its enclosing statements) needs this
/// computed once up front rather than baked into the node representation.
pub fn build_parents(arena: &Arena, roots: &[NodeId]) -> HashMap<NodeId, NodeId> {
    let mut parents = HashMap::new();
    let mut stack: Vec<NodeId> = roots.to_vec();
    while let Some(id) = stack.pop() {
        for &child in &arena.node(id).children {
            parents.entry(child).or_insert(id);
            stack.push(child);
        }
    }
    parents
}

/// Depth-bounded structural hash ("D-cup hash"). Two subtrees that are
/// structurally identical down to `depth` levels and merely collapse to the
/// same placeholder below that hash equal, which is what lets the cluster
/// engine bucket similar-but-not-identical statements together before
/// anti-unification does the precise comparison.
pub fn dcup_hash(arena: &Arena, root: NodeId, depth: u32) -> u64 {
    let mut hasher = AHasher::default();
    hash_bounded(arena, root, depth, &mut hasher);
    hasher.finish()
}

/// Unbounded structural hash: two subtrees hash equal only if they are
/// exactly identical in shape and names all the way to their leaves.
pub fn full_hash(arena: &Arena, root: NodeId) -> u64 {
    let mut hasher = AHasher::default();
    hash_bounded(arena, root, u32::MAX, &mut hasher);
    hasher.finish()
}

fn hash_bounded(arena: &Arena, id: NodeId, depth: u32, hasher: &mut AHasher) {
    let node = arena.node(id);
    match &node.kind {
        // §4.A: h(n, L) = 0 when n has no children. A leaf's name and a free
        // variable's id must not contribute here — that's what lets two
        // statements identical modulo identifier/constant renaming share a
        // hash, which is the entire premise clone detection rests on.
        NodeKind::Empty => 0u8.hash(hasher),
        NodeKind::Leaf(_) => {
            1u8.hash(hasher);
        }
        NodeKind::FreeVariable(_) => {
            4u8.hash(hasher);
        }
        NodeKind::Internal(name) => {
            2u8.hash(hasher);
            name.hash(hasher);
            node.children.len().hash(hasher);
            if depth == 0 {
                3u8.hash(hasher);
            } else {
                for &child in &node.children {
                    hash_bounded(arena, child, depth - 1, hasher);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_arena() -> (Arena, NodeId) {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let x = arena.leaf("x", file, 1);
        let one = arena.leaf("1", file, 1);
        let assign = arena.internal("Assign", vec![x, one], true, file, 1);
        (arena, assign)
    }

    #[test]
    fn height_of_leaf_is_zero() {
        let (arena, assign) = sample_arena();
        let propagated = propagate(&arena, &[assign]);
        let x = arena.node(assign).children[0];
        assert_eq!(propagated.height(x), 0);
        assert_eq!(propagated.height(assign), 1);
    }

    #[test]
    fn covered_lines_union_children() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let a = arena.leaf("a", file, 3);
        let b = arena.leaf("b", file, 7);
        let block = arena.internal("Block", vec![a, b], true, file, 0);
        let propagated = propagate(&arena, &[block]);
        let lines: Vec<u32> = propagated.covered_lines(block).iter().copied().collect();
        assert_eq!(lines, vec![3, 7]);
    }

    #[test]
    fn shared_leaf_counted_once_in_size() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let shared = arena.leaf("x", file, 1);
        let parent = arena.internal("Tuple", vec![shared, shared], false, file, 1);
        assert_eq!(size(&arena, parent, true), 2.0);
    }

    #[test]
    fn dcup_hash_collapses_below_depth() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let one = arena.leaf("1", file, 1);
        let two = arena.leaf("2", file, 1);
        let call_a = arena.internal("Call", vec![one], false, file, 1);
        let call_b = arena.internal("Call", vec![two], false, file, 1);
        assert_eq!(dcup_hash(&arena, call_a, 0), dcup_hash(&arena, call_b, 0));
    }

    #[test]
    fn full_hash_ignores_leaf_names_but_not_shape() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let one = arena.leaf("1", file, 1);
        let two = arena.leaf("2", file, 1);
        let call_a = arena.internal("Call", vec![one], false, file, 1);
        let call_b = arena.internal("Call", vec![two], false, file, 1);
        // Renaming a leaf (constant or identifier) must not change the hash:
        // this is what lets clustering find statements that differ only by
        // renamed identifiers.
        assert_eq!(full_hash(&arena, call_a), full_hash(&arena, call_b));

        let x = arena.leaf("x", file, 1);
        let other_shape = arena.internal("Return", vec![x], false, file, 1);
        assert_ne!(full_hash(&arena, call_a), full_hash(&arena, other_shape));

        let one_again = arena.leaf("1", file, 1);
        let call_with_two_args = arena.internal("Call", vec![one_again, two], false, file, 1);
        assert_ne!(full_hash(&arena, call_a), full_hash(&arena, call_with_two_args));
    }
}
