//! Candidate refinement: narrowing suffix-tree candidates down to their
//! tightest matching subrange, and dropping clones already implied by a
//! larger, enclosing clone.
//!
//! The suffix tree reports candidates by cluster-mark equality, which is
//! coarser than true anti-unification distance. [`refine_duplicates`]
//! re-measures each candidate with the precise anti-unifier and, where the
//! whole candidate doesn't meet `distance_threshold`, searches for the
//! largest subrange that does — exactly the behavior `distance_threshold`
//! of `-1` disables, per the configuration surface.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::antiunify::unify::Unifier;
use crate::core::arena::{Arena, NodeId};
use crate::core::sequence::{PairSequences, StatementSequence};

/// Re-measure and narrow every candidate in `candidates` to the largest
/// subrange whose precise anti-unification distance is below
/// `distance_threshold`, discarding candidates with no subrange that
/// qualifies. Narrowed-off prefixes/suffixes of an accepted subrange are
/// themselves requeued as new candidates, so a long suffix-tree match with
/// one noisy segment in the middle can still yield two accepted clones
/// flanking it.
pub fn refine_duplicates(
    arena: &mut Arena,
    sequences: &[StatementSequence],
    candidates: Vec<PairSequences>,
    distance_threshold: i64,
    size_threshold: usize,
) -> Vec<PairSequences> {
    let mut worklist: VecDeque<PairSequences> = candidates.into_iter().collect();
    let mut accepted = Vec::new();

    while let Some(candidate) = worklist.pop_front() {
        if candidate.length == 0 {
            continue;
        }
        let mut n = candidate.length;
        while n >= 1 {
            let mut found = None;
            for first_offset in 0..=(candidate.length - n) {
                let sub = candidate.sub_pair(first_offset, n);
                // §4.F.1.a: both sides of the sub-range must clear the
                // coverage threshold in *lines*, not elements, before its
                // anti-unifier distance is even worth computing.
                let first_lines = sub.first_sequence(sequences).covered_line_numbers_count(arena);
                let second_lines = sub.second_sequence(sequences).covered_line_numbers_count(arena);
                if first_lines < size_threshold || second_lines < size_threshold {
                    continue;
                }
                let distance = pair_distance(arena, sequences, &sub);
                if (distance as i64) < distance_threshold {
                    found = Some((first_offset, sub));
                    break;
                }
            }
            if let Some((first_offset, sub)) = found {
                let after = first_offset + n;
                if first_offset > 0 {
                    worklist.push_back(candidate.sub_pair(0, first_offset));
                }
                if after < candidate.length {
                    worklist.push_back(candidate.sub_pair(after, candidate.length - after));
                }
                accepted.push(sub);
                break;
            }
            n -= 1;
        }
    }

    accepted
}

/// The precise anti-unification distance between the two sides of `pair`,
/// computed by building a synthetic tree for each side's statement range
/// and anti-unifying them.
fn pair_distance(arena: &mut Arena, sequences: &[StatementSequence], pair: &PairSequences) -> f64 {
    let first_tree = pair.first_sequence(sequences).construct_tree(arena);
    let second_tree = pair.second_sequence(sequences).construct_tree(arena);
    let unifier = Unifier::new(arena, first_tree, second_tree);
    unifier.size(arena)
}

/// Drop any clone whose two sides are both already contained in the two
/// sides of a larger clone already in `clones` — i.e. a clone found inside
/// a loop body that is itself duplicated as part of a containing function
/// that is *also* reported as a clone is redundant with the containing
/// report.
pub fn remove_dominated_clones(
    arena: &Arena,
    parents: &HashMap<NodeId, NodeId>,
    sequences: &[StatementSequence],
    clones: &[PairSequences],
) -> Vec<PairSequences> {
    let mut statement_to_clone: HashMap<NodeId, Vec<(usize, bool)>> = HashMap::new();
    for (idx, clone) in clones.iter().enumerate() {
        for s in clone.first_sequence(sequences).statements {
            statement_to_clone.entry(s).or_default().push((idx, true));
        }
        for s in clone.second_sequence(sequences).statements {
            statement_to_clone.entry(s).or_default().push((idx, false));
        }
    }

    let mut keep = vec![true; clones.len()];
    for (idx, clone) in clones.iter().enumerate() {
        let first_stmt = clone.first_sequence(sequences).statements[0];
        let second_stmt = clone.second_sequence(sequences).statements[0];
        let first_ancestors = statement_ancestors(parents, arena, first_stmt);
        let second_ancestors: HashSet<NodeId> =
            statement_ancestors(parents, arena, second_stmt).into_iter().collect();

        'ancestors: for ancestor in &first_ancestors {
            let Some(entries) = statement_to_clone.get(ancestor) else {
                continue;
            };
            for &(other_idx, is_first_side) in entries {
                if other_idx == idx {
                    continue;
                }
                let other = &clones[other_idx];
                let opposite_side = if is_first_side {
                    other.second_sequence(sequences)
                } else {
                    other.first_sequence(sequences)
                };
                if opposite_side
                    .statements
                    .iter()
                    .any(|s| second_ancestors.contains(s))
                {
                    keep[idx] = false;
                    break 'ancestors;
                }
            }
        }
    }

    clones
        .iter()
        .enumerate()
        .filter(|&(idx, _)| keep[idx])
        .map(|(_, clone)| clone.clone())
        .collect()
}

/// Every ancestor of `start` that is itself a statement, nearest first.
fn statement_ancestors(parents: &HashMap<NodeId, NodeId>, arena: &Arena, start: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut current = start;
    while let Some(&parent) = parents.get(&current) {
        if arena.node(parent).is_statement {
            result.push(parent);
        }
        current = parent;
    }
    result
}
