//! The report collaborator contract.
//!
//! The engine never renders a report itself. Rendering HTML, XML, or any
//! other output format is a caller concern. Instead the pipeline driver
//! pushes every clone it finds, every stage timing, and every recoverable
//! warning through a [`ReportSink`] the caller supplies. [`RecordingReport`]
//! is a reference in-memory implementation used by this crate's own tests
//! and available to callers who just want the data without writing a
//! renderer.

use std::time::Duration;

use indexmap::IndexMap;

use crate::cluster::ClusterId;

/// One reported clone pair, fully resolved to file/line information.
#[derive(Debug, Clone, PartialEq)]
pub struct ClonePairReport {
    /// File the first side of the clone is in.
    pub first_file: String,
    /// First line of the first side.
    pub first_line: u32,
    /// File the second side of the clone is in.
    pub second_file: String,
    /// First line of the second side.
    pub second_line: u32,
    /// Number of statements in the matched range.
    pub length: usize,
    /// Larger of the two sides' covered-line-number counts.
    pub covered_lines: usize,
    /// The unifier tree rendered as a canonical prefix-form string, present
    /// only when `report_unifiers` is set.
    pub unifier: Option<String>,
}

/// Collaborator the pipeline driver reports progress and results through.
/// Implementations are free to render, store, or discard any of it.
pub trait ReportSink {
    /// A pipeline stage is starting.
    fn stage_started(&mut self, stage: &str) {
        let _ = stage;
    }

    /// A pipeline stage finished, after `duration`.
    fn stage_finished(&mut self, stage: &str, duration: Duration) {
        let _ = (stage, duration);
    }

    /// A recoverable problem was logged and the pipeline continued past it
    /// (an oversized sequence, a long equally-labeled run, a per-file parse
    /// failure the caller already reported upstream).
    fn warn(&mut self, message: &str);

    /// A clone was found and accepted.
    fn clone_found(&mut self, clone: ClonePairReport);

    /// Final coverage accounting: how many source lines existed across the
    /// corpus, and how many were covered by at least one reported clone.
    fn summary(&mut self, all_source_lines: usize, covered_source_lines: usize) {
        let _ = (all_source_lines, covered_source_lines);
    }

    /// One file is part of this run's corpus. Called once per [`crate::pipeline::SourceUnit`]
    /// before any stage runs, so a renderer can list every input file even
    /// if it ends up contributing no clones.
    fn add_file_name(&mut self, file: &str) {
        let _ = file;
    }

    /// A per-file problem the *collaborator* (not this engine, which never
    /// parses) encountered while producing the corpus this run analyzes —
    /// e.g. a parse failure upstream. The engine itself never calls this (it
    /// has no parse step of its own to fail); the method exists on the trait
    /// so one sink can serve both the parser and this engine's own
    /// [`ReportSink::warn`] calls.
    fn add_error(&mut self, file: &str, message: &str) {
        let _ = (file, message);
    }

    /// When `report_unifiers` is set, the generalized tree for every cluster
    /// the clustering stage produced, rendered as a canonical prefix-form
    /// string and keyed by the mark the suffix tree used as that cluster's
    /// label. Called once, after clustering and before suffix-tree search.
    fn set_mark_to_statement_hash(&mut self, marks: &IndexMap<ClusterId, String>) {
        let _ = marks;
    }
}

/// In-memory [`ReportSink`] that just records everything it's told.
#[derive(Debug, Default)]
pub struct RecordingReport {
    /// Every accepted clone, in the order it was found.
    pub clones: Vec<ClonePairReport>,
    /// Every warning, in order.
    pub warnings: Vec<String>,
    /// Stage name and duration, in order of completion.
    pub stage_timings: Vec<(String, Duration)>,
    /// Total source lines across the corpus, if [`ReportSink::summary`] was
    /// called.
    pub all_source_lines: Option<usize>,
    /// Source lines covered by at least one reported clone, if
    /// [`ReportSink::summary`] was called.
    pub covered_source_lines: Option<usize>,
    /// Every file name reported via [`ReportSink::add_file_name`], in order.
    pub file_names: Vec<String>,
    /// Every `(file, message)` pair reported via [`ReportSink::add_error`].
    pub errors: Vec<(String, String)>,
    /// The cluster-id-to-unifier-string map, if [`ReportSink::set_mark_to_statement_hash`]
    /// was called.
    pub mark_to_statement_hash: Option<IndexMap<ClusterId, String>>,
}

impl RecordingReport {
    /// A fresh, empty recorder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for RecordingReport {
    fn stage_finished(&mut self, stage: &str, duration: Duration) {
        self.stage_timings.push((stage.to_string(), duration));
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn clone_found(&mut self, clone: ClonePairReport) {
        self.clones.push(clone);
    }

    fn summary(&mut self, all_source_lines: usize, covered_source_lines: usize) {
        self.all_source_lines = Some(all_source_lines);
        self.covered_source_lines = Some(covered_source_lines);
    }

    fn add_file_name(&mut self, file: &str) {
        self.file_names.push(file.to_string());
    }

    fn add_error(&mut self, file: &str, message: &str) {
        self.errors.push((file.to_string(), message.to_string()));
    }

    fn set_mark_to_statement_hash(&mut self, marks: &IndexMap<ClusterId, String>) {
        self.mark_to_statement_hash = Some(marks.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_report_accumulates_clones_and_warnings() {
        let mut report = RecordingReport::new();
        report.warn("sequence dropped: too long");
        report.clone_found(ClonePairReport {
            first_file: "a.py".to_string(),
            first_line: 1,
            second_file: "b.py".to_string(),
            second_line: 10,
            length: 6,
            covered_lines: 6,
            unifier: None,
        });
        report.summary(100, 12);

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.clones.len(), 1);
        assert_eq!(report.all_source_lines, Some(100));
        assert_eq!(report.covered_source_lines, Some(12));
    }

    #[test]
    fn recording_report_tracks_files_errors_and_unifier_map() {
        let mut report = RecordingReport::new();
        report.add_file_name("a.py");
        report.add_error("b.py", "syntax error at line 4");

        let mut marks = IndexMap::new();
        marks.insert(ClusterId(0), "Assign(VAR(0) VAR(1))".to_string());
        report.set_mark_to_statement_hash(&marks);

        assert_eq!(report.file_names, vec!["a.py".to_string()]);
        assert_eq!(report.errors, vec![("b.py".to_string(), "syntax error at line 4".to_string())]);
        assert_eq!(report.mark_to_statement_hash.unwrap().get(&ClusterId(0)).unwrap(), "Assign(VAR(0) VAR(1))");
    }
}
