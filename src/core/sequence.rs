//! Statement sequences: the unit the suffix tree and refiner operate on.
//!
//! A [`StatementSequence`] is a maximal run of sibling statements extracted
//! from one source file. [`extract_statement_sequences`] walks an AST and
//! produces every such run at every nesting level — a function body, the
//! statements of a loop, the branches of an `if` — each becomes its own
//! sequence, regardless of how deeply it is nested in the tree.

use std::collections::BTreeSet;

use crate::core::arena::{Arena, NodeId, SourceFileId};
use crate::core::propagate;

/// Handle to a [`StatementSequence`] stored in a run's sequence table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(pub u32);

/// A maximal run of sibling statement nodes from one source file.
#[derive(Debug, Clone)]
pub struct StatementSequence {
    /// File this sequence's statements belong to.
    pub source_file: SourceFileId,
    /// The statement nodes, in source order.
    pub statements: Vec<NodeId>,
}

impl StatementSequence {
    /// Number of statements in the sequence.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the sequence has no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Sum of each statement's own size (shared nodes are not deduplicated
    /// across statements here — each statement is sized independently),
    /// used to weigh how much a candidate clone is "worth" reporting.
    pub fn weight(&self, arena: &Arena) -> f64 {
        self.statements
            .iter()
            .map(|&s| propagate::size(arena, s, true))
            .sum()
    }

    /// The set of (line number) positions covered by the sequence, used for
    /// the `f_elem` coverage-threshold check in the suffix tree search and
    /// for the final coverage accounting.
    pub fn covered_line_numbers(&self, arena: &Arena) -> BTreeSet<u32> {
        let propagated = propagate::propagate(arena, &self.statements);
        let mut lines = BTreeSet::new();
        for &s in &self.statements {
            lines.extend(propagated.covered_lines(s).iter().copied());
        }
        lines
    }

    /// Number of distinct source lines covered by the sequence.
    pub fn covered_line_numbers_count(&self, arena: &Arena) -> usize {
        self.covered_line_numbers(arena).len()
    }

    /// `(source_file, line)` pairs for every line the sequence covers, used
    /// to compute corpus-wide coverage without conflating line numbers
    /// across files.
    pub fn line_number_hashables(&self, arena: &Arena) -> Vec<(SourceFileId, u32)> {
        self.covered_line_numbers(arena)
            .into_iter()
            .map(|line| (self.source_file, line))
            .collect()
    }

    /// Extract the sub-sequence `[offset, offset + length)`.
    pub fn sub_sequence(&self, offset: usize, length: usize) -> StatementSequence {
        StatementSequence {
            source_file: self.source_file,
            statements: self.statements[offset..offset + length].to_vec(),
        }
    }

    /// Build a synthetic tree rooted at a `__SEQUENCE__` node whose children
    /// are this sequence's statements, so two sequences can be compared by
    /// anti-unifying their synthetic roots as if they were single trees.
    pub fn construct_tree(&self, arena: &mut Arena) -> NodeId {
        arena.internal(
            "__SEQUENCE__",
            self.statements.clone(),
            false,
            self.source_file,
            0,
        )
    }
}

/// A candidate clone: two sub-ranges of (possibly different) statement
/// sequences believed to be near-duplicates of each other.
#[derive(Debug, Clone)]
pub struct PairSequences {
    /// First sequence id and the sub-range within it.
    pub first: SequenceId,
    /// Offset of the first sub-range within its sequence.
    pub first_offset: usize,
    /// Second sequence id and the sub-range within it.
    pub second: SequenceId,
    /// Offset of the second sub-range within its sequence.
    pub second_offset: usize,
    /// Shared length of both sub-ranges.
    pub length: usize,
}

impl PairSequences {
    /// Extract the first sub-range as a standalone sequence.
    pub fn first_sequence<'a>(&self, sequences: &'a [StatementSequence]) -> StatementSequence {
        sequences[self.first.0 as usize].sub_sequence(self.first_offset, self.length)
    }

    /// Extract the second sub-range as a standalone sequence.
    pub fn second_sequence<'a>(&self, sequences: &'a [StatementSequence]) -> StatementSequence {
        sequences[self.second.0 as usize].sub_sequence(self.second_offset, self.length)
    }

    /// A narrower pair covering `[offset, offset + length)` of each side,
    /// relative to this pair's own ranges.
    pub fn sub_pair(&self, relative_offset: usize, length: usize) -> PairSequences {
        PairSequences {
            first: self.first,
            first_offset: self.first_offset + relative_offset,
            second: self.second,
            second_offset: self.second_offset + relative_offset,
            length,
        }
    }

    /// Larger of the two sides' covered-line-number counts, used to weigh a
    /// candidate for the suffix tree's coverage threshold check.
    pub fn max_covered_line_numbers_count(&self, arena: &Arena, sequences: &[StatementSequence]) -> usize {
        let first = self.first_sequence(sequences).covered_line_numbers_count(arena);
        let second = self.second_sequence(sequences).covered_line_numbers_count(arena);
        first.max(second)
    }
}

/// Walk the tree rooted at `root` and extract every maximal run of
/// consecutive statement-flagged children, at every nesting level, whose
/// covered source lines number at least `size_threshold` (§4.A: "when the
/// running sequence covers `≥ size_threshold` lines, emit the sequence" —
/// the threshold is a line count, not a statement count).
pub fn extract_statement_sequences(
    arena: &Arena,
    root: NodeId,
    source_file: SourceFileId,
    size_threshold: usize,
) -> Vec<StatementSequence> {
    let mut sequences = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let node = arena.node(id);
        let mut run: Vec<NodeId> = Vec::new();
        for &child in &node.children {
            if arena.node(child).is_statement {
                run.push(child);
            } else {
                flush_run(arena, &mut run, source_file, size_threshold, &mut sequences);
            }
            stack.push(child);
        }
        flush_run(arena, &mut run, source_file, size_threshold, &mut sequences);
    }
    sequences
}

fn flush_run(
    arena: &Arena,
    run: &mut Vec<NodeId>,
    source_file: SourceFileId,
    size_threshold: usize,
    out: &mut Vec<StatementSequence>,
) {
    if run.is_empty() {
        return;
    }
    // Only a qualifying run is reset here. A run that hasn't reached
    // size_threshold yet keeps accumulating across a non-statement sibling —
    // it is not discarded until it either qualifies or the walk moves to the
    // next parent node entirely.
    let lines = covered_line_count_of_run(arena, run);
    if lines >= size_threshold {
        out.push(StatementSequence {
            source_file,
            statements: std::mem::take(run),
        });
    }
}

fn covered_line_count_of_run(arena: &Arena, run: &[NodeId]) -> usize {
    let mut lines = BTreeSet::new();
    let propagated = propagate::propagate(arena, run);
    for &s in run {
        lines.extend(propagated.covered_lines(s).iter().copied());
    }
    lines.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(arena: &mut Arena, file: SourceFileId, line: u32) -> NodeId {
        let leaf = arena.leaf("x", file, line);
        arena.internal("ExprStmt", vec![leaf], true, file, line)
    }

    #[test]
    fn extracts_nested_runs_independently() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let body: Vec<NodeId> = (1..=6).map(|l| statement(&mut arena, file, l)).collect();
        let inner_block = arena.internal("Block", body.clone(), false, file, 0);
        let func = arena.internal("FunctionDef", vec![inner_block], true, file, 0);
        let module = arena.internal("Module", vec![func], false, file, 0);

        let sequences = extract_statement_sequences(&arena, module, file, 2);
        // The function body's six statements form one sequence; the module
        // body with a single (non-run-forming at threshold 2) FunctionDef
        // child does not.
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].statements.len(), 6);
    }

    #[test]
    fn short_runs_below_threshold_are_dropped() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let body: Vec<NodeId> = (1..=2).map(|l| statement(&mut arena, file, l)).collect();
        let module = arena.internal("Module", body, false, file, 0);
        let sequences = extract_statement_sequences(&arena, module, file, 5);
        assert!(sequences.is_empty());
    }

    #[test]
    fn sub_sequence_slices_statements() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let body: Vec<NodeId> = (1..=6).map(|l| statement(&mut arena, file, l)).collect();
        let seq = StatementSequence {
            source_file: file,
            statements: body,
        };
        let sub = seq.sub_sequence(2, 3);
        assert_eq!(sub.len(), 3);
    }
}
