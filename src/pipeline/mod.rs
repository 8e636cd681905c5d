//! The pipeline driver: wires the AST model, cluster engine, suffix tree,
//! and refiner together into one clone detection run.
//!
//! Concurrency & resource model: this driver runs single-threaded and
//! synchronously, start to finish, with no I/O of its own. Every stage
//! consumes the previous stage's output in full before the next begins, and
//! the only mutable shared state is the [`Arena`] itself (for allocating
//! generalized trees and free variables) — there is nothing here a second
//! thread could usefully overlap with, and the iteration orders chosen
//! throughout the cluster engine and suffix tree are what make two runs
//! over the same input produce byte-identical reports.

mod filters;

use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::cluster::{self, ClusterId, ClusterIdSource};
use crate::core::arena::{Arena, Marks, NodeId, SourceFileId};
use crate::core::config::EngineConfig;
use crate::core::errors::{CloneError, Result};
use crate::core::propagate;
use crate::core::sequence::{self, PairSequences, SequenceId, StatementSequence};
use crate::refine;
use crate::report::{ClonePairReport, ReportSink};
use crate::suffixtree::{StringId, SuffixTree};

pub use filters::{filter_long_equally_labeled_runs, filter_oversized_sequences};

/// One parsed source file, already reduced to its arena root. The engine
/// never parses anything itself — this is exactly what a caller-supplied
/// parser collaborator hands in.
#[derive(Debug, Clone, Copy)]
pub struct SourceUnit {
    /// The file's handle in the arena.
    pub file: SourceFileId,
    /// Root node of the file's AST.
    pub root: NodeId,
}

/// Summary of a completed clone detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCodeReport {
    /// Number of clone pairs reported.
    pub clones_found: usize,
    /// Number of statement sequences extracted before any filtering.
    pub sequences_extracted: usize,
    /// Total distinct source lines across the corpus considered.
    pub all_source_lines: usize,
    /// Distinct source lines covered by at least one reported clone.
    pub covered_source_lines: usize,
}

/// Run the full clone detection pipeline over an already-parsed corpus.
pub fn find_duplicate_code(
    arena: &mut Arena,
    units: &[SourceUnit],
    config: &EngineConfig,
    report: &mut dyn ReportSink,
) -> Result<DuplicateCodeReport> {
    config.validate()?;
    if units.is_empty() {
        return Err(CloneError::empty_input("no source units were supplied"));
    }

    info!(units = units.len(), "starting clone detection run");
    for unit in units {
        report.add_file_name(arena.source_file_name(unit.file));
    }
    let mut sequences = extract_all_sequences(arena, units, config);
    let sequences_extracted = sequences.len();
    if sequences.is_empty() {
        return Err(CloneError::empty_input(
            "no statement sequences met size_threshold across the supplied corpus",
        ));
    }

    let roots: Vec<NodeId> = units.iter().map(|u| u.root).collect();
    let parents = propagate::build_parents(arena, &roots);

    sequences = filter_oversized_sequences(sequences, arena, config, report);

    let (marks, cluster_weights, cluster_unifiers) = timed(report, "clusterize", || {
        clusterize_statements(arena, &sequences, config)
    });

    if config.report_unifiers {
        let rendered: IndexMap<ClusterId, String> = cluster_unifiers
            .iter()
            .map(|(&id, &tree)| (id, crate::testing::canonical_prefix_form(arena, tree)))
            .collect();
        report.set_mark_to_statement_hash(&rendered);
    }

    sequences = filter_long_equally_labeled_runs(sequences, arena, &marks, config, report);

    let all_source_lines = count_distinct_lines(arena, &sequences);

    let candidates = timed(report, "suffix_tree_search", || {
        find_candidates(arena, &sequences, &marks, &cluster_weights, config)
    });

    let accepted = if config.refinement_enabled() {
        let refined = timed(report, "refine", || {
            refine::refine_duplicates(
                arena,
                &sequences,
                candidates,
                config.distance_threshold,
                config.size_threshold,
            )
        });
        timed(report, "remove_dominated_clones", || {
            refine::remove_dominated_clones(arena, &parents, &sequences, &refined)
        })
    } else {
        candidates
    };

    let covered_source_lines = count_pair_lines(arena, &sequences, &accepted);

    if accepted.is_empty() {
        warn!("no clones found for this corpus");
    }
    for pair in &accepted {
        report.clone_found(resolve_clone(arena, &sequences, config, pair));
    }
    report.summary(all_source_lines, covered_source_lines);

    Ok(DuplicateCodeReport {
        clones_found: accepted.len(),
        sequences_extracted,
        all_source_lines,
        covered_source_lines,
    })
}

fn timed<T>(report: &mut dyn ReportSink, stage: &str, f: impl FnOnce() -> T) -> T {
    report.stage_started(stage);
    let start = Instant::now();
    let result = f();
    report.stage_finished(stage, start.elapsed());
    result
}

fn extract_all_sequences(
    arena: &Arena,
    units: &[SourceUnit],
    config: &EngineConfig,
) -> Vec<StatementSequence> {
    let mut sequences = Vec::new();
    for unit in units {
        let extracted =
            sequence::extract_statement_sequences(arena, unit.root, unit.file, config.size_threshold);
        sequences.extend(extracted);
    }
    let lengths: Vec<usize> = sequences.iter().map(StatementSequence::len).collect();
    let avg_length = if lengths.is_empty() {
        0.0
    } else {
        lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
    };
    let max_length = lengths.iter().copied().max().unwrap_or(0);
    info!(
        sequences = sequences.len(),
        avg_length, max_length, "extracted statement sequences"
    );
    sequences
}

/// Assign a cluster mark to every statement across `sequences`, using
/// whichever clustering mode `config` selects, and return the mark table,
/// each cluster's `max_covered_lines` weight (used by the suffix tree's size
/// budget), and each cluster's representative unifier tree (used only when
/// `report_unifiers` asks the driver to expose it to the report collaborator).
fn clusterize_statements(
    arena: &mut Arena,
    sequences: &[StatementSequence],
    config: &EngineConfig,
) -> (Marks, IndexMap<ClusterId, f64>, IndexMap<ClusterId, NodeId>) {
    let mut hash_to_statements: IndexMap<u64, Vec<NodeId>> = IndexMap::new();
    for seq in sequences {
        for &statement in &seq.statements {
            let key = if config.clusterize_using_hash {
                propagate::full_hash(arena, statement)
            } else {
                propagate::dcup_hash(arena, statement, config.hashing_depth)
            };
            hash_to_statements.entry(key).or_default().push(statement);
        }
    }

    let mut marks = Marks::new();
    let mut cluster_ids = ClusterIdSource::new();
    let mut weights = IndexMap::new();
    let mut unifiers = IndexMap::new();

    if config.clusterize_using_hash || config.clusterize_using_dcup {
        // Both modes mark statements by bucket directly and skip building
        // anti-unified patterns; they differ only in which hash bucketed
        // them above.
        let clusters = cluster::mark_using_hash(arena, &hash_to_statements, &mut cluster_ids, &mut marks);
        for (_, c) in clusters {
            weights.insert(c.id, c.max_covered_lines as f64);
            unifiers.insert(c.id, c.unifier_tree);
        }
    } else {
        let mut buckets =
            cluster::build_unifiers(arena, &hash_to_statements, config.clustering_threshold, &mut cluster_ids)
                .unwrap_or_default();
        let _ = cluster::clusterize(arena, &hash_to_statements, &mut buckets, &mut marks);
        for (_, local) in buckets {
            for c in local {
                weights.insert(c.id, c.max_covered_lines as f64);
                unifiers.insert(c.id, c.unifier_tree);
            }
        }
    }

    debug!(clusters = weights.len(), "clustering complete");
    (marks, weights, unifiers)
}

fn find_candidates(
    arena: &Arena,
    sequences: &[StatementSequence],
    marks: &Marks,
    cluster_weights: &IndexMap<ClusterId, f64>,
    config: &EngineConfig,
) -> Vec<PairSequences> {
    let mut tree: SuffixTree<ClusterId> = SuffixTree::new();
    let labeled: Vec<Vec<ClusterId>> = sequences
        .iter()
        .map(|seq| {
            seq.statements
                .iter()
                .map(|&s| marks.get(s).unwrap_or(ClusterId(u32::MAX)))
                .collect()
        })
        .collect();

    for (idx, labels) in labeled.iter().enumerate() {
        tree.add(StringId(idx as u32), labels);
    }

    let f_size = |cluster: ClusterId| cluster_weights.get(&cluster).copied().unwrap_or(1.0);
    let f_elem = |first: &crate::suffixtree::StringPosition<ClusterId>,
                  second: &crate::suffixtree::StringPosition<ClusterId>,
                  length: usize| {
        let first_seq = &sequences[first.string.0 as usize];
        let second_seq = &sequences[second.string.0 as usize];
        let first_cov = first_seq
            .sub_sequence(first.position, length.min(first_seq.len() - first.position))
            .covered_line_numbers_count(arena);
        let second_cov = second_seq
            .sub_sequence(second.position, length.min(second_seq.len() - second.position))
            .covered_line_numbers_count(arena);
        (first_cov as f64, second_cov as f64)
    };

    let candidates = tree.best_max_substrings(config.size_threshold as f64, &f_size, &f_elem);

    candidates
        .into_iter()
        .filter_map(|c| {
            let first_seq = &sequences[c.first.string.0 as usize];
            let second_seq = &sequences[c.second.string.0 as usize];
            let length = c
                .length
                .min(first_seq.len() - c.first.position)
                .min(second_seq.len() - c.second.position);
            if length == 0 {
                return None;
            }
            let pair = PairSequences {
                first: SequenceId(c.first.string.0),
                first_offset: c.first.position,
                second: SequenceId(c.second.string.0),
                second_offset: c.second.position,
                length,
            };
            // Clamping `length` to each side's remaining room can shrink
            // coverage below what the suffix tree search already verified;
            // re-check both sides clear `size_threshold` lines before
            // handing this candidate to the refiner.
            let first_lines = pair.first_sequence(sequences).covered_line_numbers_count(arena);
            let second_lines = pair.second_sequence(sequences).covered_line_numbers_count(arena);
            if first_lines < config.size_threshold || second_lines < config.size_threshold {
                return None;
            }
            Some(pair)
        })
        .collect()
}

fn count_distinct_lines(arena: &Arena, sequences: &[StatementSequence]) -> usize {
    let mut lines = std::collections::HashSet::new();
    for seq in sequences {
        lines.extend(seq.line_number_hashables(arena));
    }
    lines.len()
}

fn count_pair_lines(arena: &Arena, sequences: &[StatementSequence], pairs: &[PairSequences]) -> usize {
    let mut lines = std::collections::HashSet::new();
    for pair in pairs {
        lines.extend(pair.first_sequence(sequences).line_number_hashables(arena));
        lines.extend(pair.second_sequence(sequences).line_number_hashables(arena));
    }
    lines.len()
}

fn resolve_clone(
    arena: &mut Arena,
    sequences: &[StatementSequence],
    config: &EngineConfig,
    pair: &PairSequences,
) -> ClonePairReport {
    let first_seq = pair.first_sequence(sequences);
    let second_seq = pair.second_sequence(sequences);
    let first_line = first_seq
        .statements
        .first()
        .map(|&s| arena.node(s).line)
        .unwrap_or(0);
    let second_line = second_seq
        .statements
        .first()
        .map(|&s| arena.node(s).line)
        .unwrap_or(0);
    let covered = pair.max_covered_line_numbers_count(arena, sequences);

    let unifier = if config.report_unifiers {
        let t1 = first_seq.construct_tree(arena);
        let t2 = second_seq.construct_tree(arena);
        let unifier = crate::antiunify::unify::Unifier::new(arena, t1, t2);
        Some(crate::testing::canonical_prefix_form(arena, unifier.tree))
    } else {
        None
    };

    ClonePairReport {
        first_file: arena.source_file_name(first_seq.source_file).to_string(),
        first_line,
        second_file: arena.source_file_name(second_seq.source_file).to_string(),
        second_line,
        length: pair.length,
        covered_lines: covered,
        unifier,
    }
}
