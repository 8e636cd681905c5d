//! Free variables and substitutions.
//!
//! A [`Substitution`] maps the free variables introduced while
//! anti-unifying two trees back to the original subtree each one stands in
//! for. Two substitutions come out of every [`crate::antiunify::unify::Unifier`],
//! one per input tree, and their combined size is the anti-unification
//! distance between the two inputs.

use indexmap::IndexMap;

use crate::core::arena::{Arena, FreeVariableId, NodeId, NodeKind};
use crate::core::propagate;

/// Fixed credit subtracted per free variable when sizing a substitution.
/// A variable replacing a single-node subtree should contribute roughly
/// nothing to the distance (it's replacing one concrete leaf with one
/// placeholder leaf), so its size is discounted by this amount rather than
/// counted at full size-1 weight.
pub const FREE_VARIABLE_COST: f64 = 0.5;

/// A free variable introduced by the anti-unifier, together with the
/// placeholder node standing for it in a unifier tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FreeVariable {
    /// Run-scoped identifier.
    pub id: FreeVariableId,
    /// The placeholder leaf node (named `VAR(id)`) inserted into the
    /// unifier tree in place of the diverging subtrees.
    pub node: NodeId,
}

/// Maps each free variable introduced during anti-unification to the
/// subtree of one particular input tree that it generalized away.
/// Insertion-ordered so iteration order is reproducible between runs.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    map: IndexMap<FreeVariableId, NodeId>,
}

impl Substitution {
    /// An empty substitution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `var` stands for `value` in this tree.
    pub fn insert(&mut self, var: FreeVariableId, value: NodeId) {
        self.map.insert(var, value);
    }

    /// The subtree a variable stands for, if this substitution assigned one.
    pub fn get(&self, var: FreeVariableId) -> Option<NodeId> {
        self.map.get(&var).copied()
    }

    /// Number of variables this substitution assigns.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether this substitution assigns no variables (the two trees it
    /// came from were identical).
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate `(variable, subtree)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (FreeVariableId, NodeId)> + '_ {
        self.map.iter().map(|(k, v)| (*k, *v))
    }

    /// Total size of this substitution: the sum, over every variable it
    /// assigns, of that variable's subtree size (including `Empty` nodes)
    /// minus [`FREE_VARIABLE_COST`]. This is the generalization cost this
    /// tree alone contributed to its unifier.
    pub fn size(&self, arena: &Arena) -> f64 {
        self.map
            .values()
            .map(|&value| propagate::size(arena, value, false) - FREE_VARIABLE_COST)
            .sum()
    }

    /// Apply this substitution to `node`: every `FreeVariable` leaf bound by
    /// this substitution is replaced by its assigned subtree; unbound
    /// `FreeVariable`s and every other node kind pass through unchanged.
    /// Invariant 3 (§8) is this: applying a unifier's `sub1` back to its
    /// generalized tree reconstructs the first input, structurally.
    pub fn apply(&self, arena: &mut Arena, node: NodeId) -> NodeId {
        let record = arena.node(node).clone();
        if let NodeKind::FreeVariable(id) = record.kind {
            return self.get(id).unwrap_or(node);
        }
        if record.children.is_empty() {
            return node;
        }
        let mut children = Vec::with_capacity(record.children.len());
        let mut changed = false;
        for &child in &record.children {
            let replaced = self.apply(arena, child);
            changed |= replaced != child;
            children.push(replaced);
        }
        if !changed {
            return node;
        }
        match record.kind {
            NodeKind::Internal(name) => arena.internal(name, children, record.is_statement, record.source_file, record.line),
            _ => node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arena::Arena;

    #[test]
    fn empty_substitution_has_zero_size() {
        let arena = Arena::new();
        let sub = Substitution::new();
        assert_eq!(sub.size(&arena), 0.0);
    }

    #[test]
    fn single_leaf_substitution_size() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let leaf = arena.leaf("x", file, 1);
        let var = arena.fresh_free_variable();

        let mut sub = Substitution::new();
        sub.insert(var, leaf);
        assert_eq!(sub.size(&arena), 1.0 - FREE_VARIABLE_COST);
    }

    #[test]
    fn apply_substitutes_bound_free_variable() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let leaf = arena.leaf("x", file, 1);
        let var = arena.fresh_free_variable();
        let placeholder = arena.free_variable_node(var, file, 1);
        let wrapper = arena.internal("ExprStmt", vec![placeholder], true, file, 1);

        let mut sub = Substitution::new();
        sub.insert(var, leaf);
        let result = sub.apply(&mut arena, wrapper);
        assert_eq!(arena.node(result).children[0], leaf);
    }

    #[test]
    fn apply_leaves_unbound_free_variable_untouched() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let var = arena.fresh_free_variable();
        let placeholder = arena.free_variable_node(var, file, 1);

        let sub = Substitution::new();
        let result = sub.apply(&mut arena, placeholder);
        assert_eq!(result, placeholder);
    }

    #[test]
    fn insertion_order_preserved() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let a = arena.leaf("a", file, 1);
        let b = arena.leaf("b", file, 2);
        let var_a = arena.fresh_free_variable();
        let var_b = arena.fresh_free_variable();

        let mut sub = Substitution::new();
        sub.insert(var_b, b);
        sub.insert(var_a, a);
        let order: Vec<FreeVariableId> = sub.entries().map(|(v, _)| v).collect();
        assert_eq!(order, vec![var_b, var_a]);
    }
}
