//! Statement-sequence filters run between extraction and clustering.
//!
//! Both filters exist to keep a handful of degenerate inputs — a single
//! enormous generated file, a long run of boilerplate statements that all
//! hash identically (an import block, a table of constants) — from either
//! blowing up the suffix tree search or dominating its output with
//! uninteresting matches. Both are no-ops when `force` is set, matching the
//! original tool's escape hatch for callers who want every sequence
//! considered regardless of cost.

use crate::cluster::ClusterId;
use crate::core::arena::{Arena, Marks};
use crate::core::config::{EngineConfig, LONG_RUN_LENGTH, MAX_SEQUENCE_LENGTH};
use crate::core::errors::CloneError;
use crate::core::sequence::StatementSequence;
use crate::report::ReportSink;

/// Drop any sequence longer than [`MAX_SEQUENCE_LENGTH`], logging a
/// recoverable [`CloneError::OversizedSequence`] through `report` for each
/// one dropped.
pub fn filter_oversized_sequences(
    sequences: Vec<StatementSequence>,
    arena: &Arena,
    config: &EngineConfig,
    report: &mut dyn ReportSink,
) -> Vec<StatementSequence> {
    sequences
        .into_iter()
        .filter(|seq| {
            if seq.len() <= MAX_SEQUENCE_LENGTH || config.force {
                return true;
            }
            let first_line = seq.statements.first().map(|&s| arena.node(s).line).unwrap_or(0);
            let err = CloneError::oversized_sequence(
                arena.source_file_name(seq.source_file),
                first_line as usize,
                seq.len(),
            );
            report.warn(&err.to_string());
            false
        })
        .collect()
}

/// Split every sequence at any run of at least [`LONG_RUN_LENGTH`]
/// consecutive statements sharing one cluster mark, dropping the run itself
/// and keeping the flanking pieces as their own sequences. A mark of `None`
/// (a statement the cluster engine never saw) never starts or extends a
/// run.
pub fn filter_long_equally_labeled_runs(
    sequences: Vec<StatementSequence>,
    arena: &Arena,
    marks: &Marks,
    config: &EngineConfig,
    report: &mut dyn ReportSink,
) -> Vec<StatementSequence> {
    if config.force {
        return sequences;
    }
    let mut out = Vec::new();
    for seq in &sequences {
        split_long_runs(seq, arena, marks, &mut out, report);
    }
    out
}

fn split_long_runs(
    seq: &StatementSequence,
    arena: &Arena,
    marks: &Marks,
    out: &mut Vec<StatementSequence>,
    report: &mut dyn ReportSink,
) {
    let labels: Vec<Option<ClusterId>> = seq.statements.iter().map(|&s| marks.get(s)).collect();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < labels.len() {
        let mut j = i;
        while labels[i].is_some() && j + 1 < labels.len() && labels[j + 1] == labels[i] {
            j += 1;
        }
        let run_len = j - i + 1;
        if labels[i].is_some() && run_len >= LONG_RUN_LENGTH {
            if i > start {
                out.push(seq.sub_sequence(start, i - start));
            }
            let first_line = arena.node(seq.statements[i]).line;
            report.warn(&format!(
                "dropping {run_len}-statement equally-labeled run at {}:{first_line}",
                arena.source_file_name(seq.source_file)
            ));
            start = j + 1;
        }
        i = j + 1;
    }
    if start < labels.len() {
        out.push(seq.sub_sequence(start, labels.len() - start));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterIdSource;
    use crate::core::arena::Arena;
    use crate::report::RecordingReport;

    fn run_of(arena: &mut Arena, label: &str, count: usize) -> StatementSequence {
        let file = arena.add_source_file("a.py");
        let statements: Vec<_> = (0..count)
            .map(|i| {
                let leaf = arena.leaf(label, file, i as u32);
                arena.internal("ExprStmt", vec![leaf], true, file, i as u32)
            })
            .collect();
        StatementSequence { source_file: file, statements }
    }

    #[test]
    fn oversized_sequence_is_dropped_unless_forced() {
        let mut arena = Arena::new();
        let seq = run_of(&mut arena, "x", MAX_SEQUENCE_LENGTH + 1);
        let mut report = RecordingReport::new();

        let config = EngineConfig::default();
        let kept = filter_oversized_sequences(vec![seq.clone()], &arena, &config, &mut report);
        assert!(kept.is_empty());
        assert_eq!(report.warnings.len(), 1);

        let forced = EngineConfig { force: true, ..Default::default() };
        let mut report2 = RecordingReport::new();
        let kept2 = filter_oversized_sequences(vec![seq], &arena, &forced, &mut report2);
        assert_eq!(kept2.len(), 1);
    }

    #[test]
    fn long_equally_labeled_run_is_split_out() {
        let mut arena = Arena::new();
        let seq = run_of(&mut arena, "x", LONG_RUN_LENGTH + 2);
        let mut marks = Marks::new();
        let mut ids = ClusterIdSource::new();
        let cluster = ids.next();
        for &s in &seq.statements {
            marks.set(s, cluster);
        }

        let config = EngineConfig::default();
        let mut report = RecordingReport::new();
        let out = filter_long_equally_labeled_runs(vec![seq], &arena, &marks, &config, &mut report);
        assert!(out.is_empty(), "the whole run is one oversized label block with nothing left flanking it");
        assert_eq!(report.warnings.len(), 1);
    }
}
