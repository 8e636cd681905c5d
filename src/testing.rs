//! Test-support helpers shared by this crate's unit tests.
//!
//! Building arenas by hand, statement by statement, gets repetitive fast;
//! [`TreeBuilder`] wraps the raw [`Arena`] API with shorthand for the shapes
//! unit tests reach for most often (a statement wrapping one expression, a
//! block of several, a deliberately shared leaf). [`canonical_prefix_form`]
//! renders a tree back out as a string so a test can assert on a unifier's
//! shape without hand-walking `NodeId`s.

use crate::core::arena::{Arena, NodeId, NodeKind, SourceFileId};

/// Convenience wrapper around an [`Arena`] for constructing small trees in
/// tests. Every tree is attributed to a single source file created up front.
pub struct TreeBuilder {
    /// The underlying arena. Public so a test can hand it straight to the
    /// function under test once the tree is built.
    pub arena: Arena,
    /// The single source file every node built through this wrapper belongs
    /// to.
    pub file: SourceFileId,
    next_line: u32,
}

impl TreeBuilder {
    /// A fresh builder with one registered source file named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let mut arena = Arena::new();
        let file = arena.add_source_file(name);
        Self { arena, file, next_line: 1 }
    }

    fn line(&mut self) -> u32 {
        let line = self.next_line;
        self.next_line += 1;
        line
    }

    /// Insert a leaf named `name` on the next line.
    pub fn leaf(&mut self, name: impl Into<String>) -> NodeId {
        let line = self.line();
        self.arena.leaf(name, self.file, line)
    }

    /// Insert a leaf named `name` at an explicit line, so a test can
    /// construct two nodes that share everything but position.
    pub fn leaf_at(&mut self, name: impl Into<String>, line: u32) -> NodeId {
        self.arena.leaf(name, self.file, line)
    }

    /// Wrap `children` as a non-statement internal node named `name`.
    pub fn expr(&mut self, name: impl Into<String>, children: Vec<NodeId>) -> NodeId {
        let line = self.line();
        self.arena.internal(name, children, false, self.file, line)
    }

    /// Wrap `child` as a single-child statement node named `name` (the
    /// shape most unit tests want for a "one-expression statement").
    pub fn stmt(&mut self, name: impl Into<String>, child: NodeId) -> NodeId {
        let line = self.line();
        self.arena.internal(name, vec![child], true, self.file, line)
    }

    /// Build `count` independent statement leaves, one per line, suitable
    /// for feeding straight into [`crate::core::sequence::StatementSequence`].
    pub fn statement_run(&mut self, label: &str, count: usize) -> Vec<NodeId> {
        (0..count)
            .map(|_| {
                let leaf = self.leaf(label);
                self.stmt("ExprStmt", leaf)
            })
            .collect()
    }

    /// Wrap a run of sibling statements in a non-statement block node, the
    /// way a function body or loop body would be represented.
    pub fn block(&mut self, statements: Vec<NodeId>) -> NodeId {
        let line = self.line();
        self.arena.internal("Block", statements, false, self.file, line)
    }
}

/// Render the subtree rooted at `root` as a canonical, deterministic prefix
/// string: `Name(child1 child2 ...)` for internal nodes, the bare name for
/// leaves, and `None` for empty slots. Two trees that would anti-unify to
/// distance zero always render identically, which is what makes this useful
/// for asserting a unifier's generalized shape in a test without comparing
/// raw `NodeId`s (which differ run to run).
pub fn canonical_prefix_form(arena: &Arena, root: NodeId) -> String {
    let node = arena.node(root);
    match &node.kind {
        NodeKind::Empty => "None".to_string(),
        NodeKind::Leaf(name) => name.clone(),
        NodeKind::FreeVariable(var) => format!("VAR({})", var.0),
        NodeKind::Internal(name) => {
            let children: Vec<String> = node
                .children
                .iter()
                .map(|&c| canonical_prefix_form(arena, c))
                .collect();
            format!("{name}({})", children.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_distinct_statement_nodes() {
        let mut builder = TreeBuilder::new("a.py");
        let run = builder.statement_run("x", 4);
        assert_eq!(run.len(), 4);
        assert!(run.windows(2).all(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn canonical_form_renders_shared_leaf_once_per_occurrence() {
        let mut builder = TreeBuilder::new("a.py");
        let shared = builder.leaf("x");
        let tuple = builder.expr("Tuple", vec![shared, shared]);
        assert_eq!(canonical_prefix_form(&builder.arena, tuple), "Tuple(x x)");
    }

    #[test]
    fn canonical_form_matches_for_structurally_equal_trees() {
        let mut left = TreeBuilder::new("a.py");
        let a = left.leaf("a");
        let one = left.leaf_at("1", 1);
        let assign_left = left.arena.internal("Assign", vec![a, one], true, left.file, 1);

        let mut right = TreeBuilder::new("b.py");
        let a2 = right.leaf("a");
        let one2 = right.leaf_at("1", 1);
        let assign_right = right.arena.internal("Assign", vec![a2, one2], true, right.file, 1);

        assert_eq!(
            canonical_prefix_form(&left.arena, assign_left),
            canonical_prefix_form(&right.arena, assign_right)
        );
    }
}
