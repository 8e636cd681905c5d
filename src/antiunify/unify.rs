//! Anti-unification: computing the most-specific generalization of two
//! trees and the substitutions that map it back onto each input.
//!
//! `unify(node1, node2)` is the heart of the whole engine: every cluster
//! add-cost and every refinement distance is an anti-unification size.

use crate::antiunify::substitution::Substitution;
use crate::core::arena::{Arena, NodeId, NodeKind};

/// Whether two diverging subtrees should attempt to reuse an existing free
/// variable when they recur identically elsewhere in the same unification,
/// instead of always allocating a fresh one. Always `false` in this engine:
/// the reuse behavior exists in the originating tool's source but is never
/// driven to `true` by any caller, so no code path here constructs a
/// `Unifier` asking for it. Recursive calls receive the same value they
/// were given, unmodified.
pub const DEFAULT_IGNORE_PARAMETRIZATION: bool = false;

/// The most-specific generalization of two trees, together with the
/// substitution mapping it back onto each of them.
#[derive(Debug)]
pub struct Unifier {
    /// The generalized tree. Where the two inputs agreed it mirrors them
    /// exactly; where they diverged it holds a free-variable placeholder.
    pub tree: NodeId,
    /// Maps each placeholder back to the first input's subtree.
    pub sub1: Substitution,
    /// Maps each placeholder back to the second input's subtree.
    pub sub2: Substitution,
}

impl Unifier {
    /// Anti-unify `node1` and `node2`, allocating new nodes for the
    /// generalized tree (and new free variables for divergence points) in
    /// `arena`.
    pub fn new(arena: &mut Arena, node1: NodeId, node2: NodeId) -> Self {
        let mut sub1 = Substitution::new();
        let mut sub2 = Substitution::new();
        let tree = unify(arena, node1, node2, DEFAULT_IGNORE_PARAMETRIZATION, &mut sub1, &mut sub2);
        Self { tree, sub1, sub2 }
    }

    /// The anti-unification distance between the two inputs: the combined
    /// size of both substitutions. Zero means the inputs were identical.
    pub fn size(&self, arena: &Arena) -> f64 {
        self.sub1.size(arena) + self.sub2.size(arena)
    }
}

/// Anti-unify `node1` and `node2` into `arena`, recording divergences into
/// `sub1`/`sub2`, and return the handle of the generalized node.
///
/// `node1 == node2` (handle identity) short-circuits immediately and
/// contributes nothing to either substitution. This is what lets two
/// parents sharing one leaf (or, after a first unification pass, two
/// statements already folded into the same cluster) recombine for free.
pub fn unify(
    arena: &mut Arena,
    node1: NodeId,
    node2: NodeId,
    ignore_parametrization: bool,
    sub1: &mut Substitution,
    sub2: &mut Substitution,
) -> NodeId {
    if node1 == node2 {
        return node1;
    }

    let rec1 = arena.node(node1).clone();
    let rec2 = arena.node(node2).clone();

    let mismatch = match (&rec1.kind, &rec2.kind) {
        (NodeKind::Internal(n1), NodeKind::Internal(n2)) => {
            n1 != n2 || rec1.children.len() != rec2.children.len()
        }
        (NodeKind::Leaf(n1), NodeKind::Leaf(n2)) => n1 != n2,
        (NodeKind::Empty, NodeKind::Empty) => false,
        (NodeKind::FreeVariable(v1), NodeKind::FreeVariable(v2)) => v1 != v2,
        _ => true,
    };

    if mismatch {
        let var = arena.fresh_free_variable();
        let placeholder = arena.free_variable_node(var, rec1.source_file, rec1.line);
        sub1.insert(var, node1);
        sub2.insert(var, node2);
        return placeholder;
    }

    match rec1.kind {
        NodeKind::Leaf(ref name) => arena.leaf(name.clone(), rec1.source_file, rec1.line),
        NodeKind::Empty => arena.empty(rec1.source_file, rec1.line),
        NodeKind::FreeVariable(id) => arena.free_variable_node(id, rec1.source_file, rec1.line),
        NodeKind::Internal(ref name) => {
            let mut children = Vec::with_capacity(rec1.children.len());
            for (&c1, &c2) in rec1.children.iter().zip(rec2.children.iter()) {
                // Anti-unify this child pair in isolation first, then fold
                // whatever fresh variables it introduced into the shared
                // accumulator (`combine`), rather than inserting them
                // straight into `sub1`/`sub2`: two different divergence
                // points within the same parent can generalize the exact
                // same pair of subtrees (e.g. `Assign(Name(i), Name(i))` vs
                // `Assign(Name(j), Name(j))`), and §4.B's substitution
                // combination step is what lets them share one placeholder
                // instead of allocating two.
                let mut child_sub1 = Substitution::new();
                let mut child_sub2 = Substitution::new();
                let child_tree = unify(arena, c1, c2, ignore_parametrization, &mut child_sub1, &mut child_sub2);
                let merged = combine(
                    arena,
                    child_tree,
                    &child_sub1,
                    &child_sub2,
                    sub1,
                    sub2,
                    ignore_parametrization,
                );
                children.push(merged);
            }
            arena.internal(name.clone(), children, rec1.is_statement, rec1.source_file, rec1.line)
        }
    }
}

/// Fold one child's freshly computed substitution pair (`child_sub1`,
/// `child_sub2`) into the accumulator substitutions (`accum1`, `accum2`)
/// being built for the parent, per §4.B's "Substitution combination".
///
/// For each free variable `v` the child introduced: unless
/// `ignore_parametrization`, search the accumulator for an existing
/// variable `w` whose bindings in both substitutions are *structurally*
/// equal to `v`'s (`accum1[w] ≡ child_sub1[v] ∧ accum2[w] ≡ child_sub2[v]`).
/// If found, `v` is relabeled to `w` in `child_tree` instead of being
/// inserted — the two divergence sites describe the same generalization and
/// collapse onto one placeholder. Otherwise `v` is inserted into both
/// accumulators unchanged.
fn combine(
    arena: &mut Arena,
    child_tree: NodeId,
    child_sub1: &Substitution,
    child_sub2: &Substitution,
    accum1: &mut Substitution,
    accum2: &mut Substitution,
    ignore_parametrization: bool,
) -> NodeId {
    let mut relabel = Substitution::new();
    for (var, value1) in child_sub1.entries() {
        let value2 = child_sub2
            .get(var)
            .expect("a free variable is always bound on both sides of a unification");

        let mut reused = None;
        if !ignore_parametrization {
            for (candidate, candidate_value1) in accum1.entries() {
                let Some(candidate_value2) = accum2.get(candidate) else {
                    continue;
                };
                if arena.structural_eq(candidate_value1, value1) && arena.structural_eq(candidate_value2, value2) {
                    reused = Some(candidate);
                    break;
                }
            }
        }

        match reused {
            Some(existing) => {
                let (file, line) = {
                    let rec = arena.node(child_tree);
                    (rec.source_file, rec.line)
                };
                let replacement = arena.free_variable_node(existing, file, line);
                relabel.insert(var, replacement);
            }
            None => {
                accum1.insert(var, value1);
                accum2.insert(var, value2);
            }
        }
    }

    if relabel.is_empty() {
        child_tree
    } else {
        // Relabeling a child's fresh variables onto ones the parent already
        // accumulated is exactly `Substitution::apply`: `relabel`'s domain is
        // only ever `FreeVariable` leaves, and its values are themselves
        // fresh placeholder nodes for the parent's variables.
        relabel.apply(arena, child_tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arena::Arena;

    #[test]
    fn identical_handles_short_circuit_with_zero_distance() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let leaf = arena.leaf("x", file, 1);
        let unifier = Unifier::new(&mut arena, leaf, leaf);
        assert_eq!(unifier.tree, leaf);
        assert_eq!(unifier.size(&arena), 0.0);
    }

    #[test]
    fn differing_leaves_combine_into_a_variable() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let a = arena.leaf("a", file, 1);
        let b = arena.leaf("b", file, 2);
        let unifier = Unifier::new(&mut arena, a, b);
        assert!(unifier.size(&arena) > 0.0);
        assert_eq!(unifier.sub1.len(), 1);
        assert_eq!(unifier.sub2.len(), 1);
    }

    #[test]
    fn same_name_leaves_unify_without_a_variable_even_if_distinct() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let x1 = arena.leaf("x", file, 1);
        let x2 = arena.leaf("x", file, 5);
        let unifier = Unifier::new(&mut arena, x1, x2);
        assert_eq!(unifier.size(&arena), 0.0);
        assert!(unifier.sub1.is_empty());
    }

    #[test]
    fn matching_internal_nodes_recurse_into_children() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let a1 = arena.leaf("a", file, 1);
        let b1 = arena.leaf("1", file, 1);
        let assign1 = arena.internal("Assign", vec![a1, b1], true, file, 1);

        let a2 = arena.leaf("a", file, 2);
        let b2 = arena.leaf("2", file, 2);
        let assign2 = arena.internal("Assign", vec![a2, b2], true, file, 2);

        let unifier = Unifier::new(&mut arena, assign1, assign2);
        // "a" unifies for free; "1" vs "2" need one variable.
        assert_eq!(unifier.sub1.len(), 1);
        assert_eq!(unifier.sub2.len(), 1);
    }

    #[test]
    fn different_arities_force_a_variable() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let a = arena.leaf("a", file, 1);
        let call1 = arena.internal("Call", vec![a], false, file, 1);
        let call2 = arena.internal("Call", vec![], false, file, 1);

        let unifier = Unifier::new(&mut arena, call1, call2);
        assert_eq!(unifier.sub1.len(), 1);
        assert_eq!(unifier.sub2.len(), 1);
    }

    #[test]
    fn identical_sibling_divergences_collapse_onto_one_variable() {
        // Assign(Name(i), Name(i)) vs Assign(Name(j), Name(j)): both
        // children diverge the same way, so §4.B's combine step should
        // collapse them onto a single shared placeholder instead of
        // allocating two.
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let i1 = arena.leaf("i", file, 1);
        let i2 = arena.leaf("i", file, 1);
        let assign1 = arena.internal("Assign", vec![i1, i2], true, file, 1);

        let j1 = arena.leaf("j", file, 2);
        let j2 = arena.leaf("j", file, 2);
        let assign2 = arena.internal("Assign", vec![j1, j2], true, file, 2);

        let unifier = Unifier::new(&mut arena, assign1, assign2);
        assert_eq!(unifier.sub1.len(), 1, "both divergences share one placeholder");
        assert_eq!(unifier.sub2.len(), 1);

        let children = &arena.node(unifier.tree).children;
        assert_eq!(children[0], children[1], "the unifier tree reuses the same placeholder node");
    }

    #[test]
    fn distinct_sibling_divergences_stay_separate() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let a1 = arena.leaf("i", file, 1);
        let a2 = arena.leaf("k", file, 1);
        let assign1 = arena.internal("Assign", vec![a1, a2], true, file, 1);

        let b1 = arena.leaf("j", file, 2);
        let b2 = arena.leaf("l", file, 2);
        let assign2 = arena.internal("Assign", vec![b1, b2], true, file, 2);

        let unifier = Unifier::new(&mut arena, assign1, assign2);
        assert_eq!(unifier.sub1.len(), 2, "unrelated divergences each get their own placeholder");
        assert_eq!(unifier.sub2.len(), 2);
    }
}
