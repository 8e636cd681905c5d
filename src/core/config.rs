//! Configuration surface for a clone detection run.
//!
//! Mirrors the options an original `clonedigger`-style tool exposes as
//! module-level CLI arguments (`clustering_threshold`, `distance_threshold`,
//! `size_threshold`, `hashing_depth`, the clustering-mode flags, and
//! `force`), but as an explicit, validated, per-run value instead of process
//! globals.

use serde::{Deserialize, Serialize};

use crate::core::errors::{CloneError, Result};

/// Minimal size of a statement sequence, in covered source lines, to be
/// considered during extraction and refinement.
const DEFAULT_SIZE_THRESHOLD: usize = 5;

/// Maximum anti-unification distance for a candidate pair to be accepted as
/// a clone. `-1` disables refinement entirely: suffix-tree candidates are
/// reported unchanged.
const DEFAULT_DISTANCE_THRESHOLD: i64 = 5;

/// Maximum add-cost for a statement to join an existing cluster rather than
/// start a new one.
const DEFAULT_CLUSTERING_THRESHOLD: f64 = 10.0;

/// Depth bound used by the D-cup structural hash when bucketing statements
/// before clustering.
const DEFAULT_HASHING_DEPTH: u32 = 1;

/// Length at which a run of consecutive statements sharing one cluster mark
/// is split, to keep boilerplate (e.g. long `import` blocks) from dominating
/// the suffix tree. One past the last accepted run length.
pub const LONG_RUN_LENGTH: usize = 11;

/// Statement sequences longer than this are dropped unless `force` is set.
pub const MAX_SEQUENCE_LENGTH: usize = 1000;

/// Validated configuration for a single clone detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimal size, in covered source lines, of a sequence to be extracted
    /// and of a candidate substring accepted by the suffix tree search.
    pub size_threshold: usize,

    /// Maximum anti-unification distance for a refined candidate to be kept.
    /// `-1` disables the refinement pass.
    pub distance_threshold: i64,

    /// Maximum add-cost for a statement to join an existing cluster.
    pub clustering_threshold: f64,

    /// Depth bound for the D-cup structural hash.
    pub hashing_depth: u32,

    /// Bucket statements purely by full structural hash (exact match),
    /// skipping anti-unification based clustering entirely.
    pub clusterize_using_hash: bool,

    /// Bucket statements by D-cup hash before anti-unification based
    /// clustering, instead of bucketing by full hash.
    pub clusterize_using_dcup: bool,

    /// Process oversized sequences and long equally-labeled runs instead of
    /// dropping/splitting them.
    pub force: bool,

    /// Include the per-cluster unifier tree in the report output.
    pub report_unifiers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            clustering_threshold: DEFAULT_CLUSTERING_THRESHOLD,
            hashing_depth: DEFAULT_HASHING_DEPTH,
            clusterize_using_hash: false,
            clusterize_using_dcup: false,
            force: false,
            report_unifiers: false,
        }
    }
}

impl EngineConfig {
    /// Validate every field, returning a [`CloneError::Config`] naming the
    /// first offending field.
    pub fn validate(&self) -> Result<()> {
        validate_positive_usize(self.size_threshold, "size_threshold")?;
        validate_distance_threshold(self.distance_threshold)?;
        validate_non_negative_f64(self.clustering_threshold, "clustering_threshold")?;
        validate_positive_u32(self.hashing_depth, "hashing_depth")?;
        if self.clusterize_using_hash && self.clusterize_using_dcup {
            return Err(CloneError::config_field(
                "clusterize_using_hash and clusterize_using_dcup are mutually exclusive",
                "clusterize_using_dcup",
            ));
        }
        Ok(())
    }

    /// Whether the refinement pass (distance-based sub-range narrowing and
    /// dominated-clone removal) should run at all.
    pub fn refinement_enabled(&self) -> bool {
        self.distance_threshold != -1
    }
}

fn validate_positive_usize(value: usize, field: &'static str) -> Result<()> {
    if value == 0 {
        return Err(CloneError::config_field(
            format!("{field} must be greater than zero, got {value}"),
            field,
        ));
    }
    Ok(())
}

fn validate_positive_u32(value: u32, field: &'static str) -> Result<()> {
    if value == 0 {
        return Err(CloneError::config_field(
            format!("{field} must be greater than zero, got {value}"),
            field,
        ));
    }
    Ok(())
}

fn validate_non_negative_f64(value: f64, field: &'static str) -> Result<()> {
    if value < 0.0 || !value.is_finite() {
        return Err(CloneError::config_field(
            format!("{field} must be a non-negative finite number, got {value}"),
            field,
        ));
    }
    Ok(())
}

fn validate_distance_threshold(value: i64) -> Result<()> {
    if value < -1 {
        return Err(CloneError::config_field(
            format!("distance_threshold must be -1 (disabled) or non-negative, got {value}"),
            "distance_threshold",
        ));
    }
    Ok(())
}
