//! The cluster engine: groups structurally similar statements so the
//! suffix tree can treat "close enough" statements as the same symbol.
//!
//! Clustering happens local to each hash bucket (statements with different
//! hashes never compete for the same cluster), in two passes:
//!
//! 1. [`build_unifiers`] folds statements into clusters one at a time,
//!    picking the cheapest existing cluster to join or starting a new one
//!    when none is cheap enough (`clustering_threshold`). This pass
//!    actually merges trees via [`Cluster::unify`] and so is order-sensitive.
//! 2. [`clusterize`] re-scans every statement against the clusters
//!    [`build_unifiers`] produced and assigns each one a mark, the cluster
//!    label the suffix tree will use as that statement's symbol. This pass
//!    never merges trees, only marks and updates bookkeeping
//!    ([`Cluster::add_without_unification`]).
//!
//! A third, simpler path ([`mark_using_hash`]) skips anti-unification
//! entirely: one cluster per hash bucket, every member of the bucket
//! marked with it directly. Both `clusterize_using_hash` (buckets are keyed
//! by the unbounded full hash) and `clusterize_using_dcup` (buckets are
//! keyed by the depth-bounded D-cup hash) route here — they differ only in
//! which hash partitioned the statements, not in what clustering does with
//! the result.

use indexmap::IndexMap;

use crate::antiunify::unify::Unifier;
use crate::core::arena::{Arena, Marks, NodeId};
use crate::core::errors::{CloneError, Result};
use crate::core::propagate;

/// Identifier of a cluster, unique within one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub u32);

/// Allocates [`ClusterId`]s for one pipeline run.
#[derive(Debug, Default)]
pub struct ClusterIdSource(u32);

impl ClusterIdSource {
    /// A fresh id source starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next(&mut self) -> ClusterId {
        let id = ClusterId(self.0);
        self.0 += 1;
        id
    }
}

/// A group of statements considered interchangeable for clone-detection
/// purposes, represented by a running anti-unification of its members.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// This cluster's id.
    pub id: ClusterId,
    /// The generalized tree of every statement folded in via [`Cluster::unify`].
    pub unifier_tree: NodeId,
    /// Every statement ever added to this cluster, by either path.
    pub members: Vec<NodeId>,
    /// Number of statements unified into `unifier_tree` via [`Cluster::unify`].
    /// Statements added via [`Cluster::add_without_unification`] are tracked
    /// in `members` but do not change `unifier_tree`, matching the
    /// clusterize pass's re-scan semantics.
    pub count: usize,
    /// Largest covered-line-number count observed among this cluster's
    /// members, used by the suffix tree's coverage threshold.
    pub max_covered_lines: usize,
}

impl Cluster {
    /// A brand-new cluster containing only `tree`, whose `max_covered_lines`
    /// starts at `tree`'s own covered-line count rather than zero (a
    /// singleton cluster that is never touched again by
    /// [`Cluster::add_without_unification`] must still report its one
    /// member's real coverage to the suffix tree's size weighting).
    pub fn new_singleton(arena: &Arena, id: ClusterId, tree: NodeId) -> Self {
        Self {
            id,
            unifier_tree: tree,
            members: vec![tree],
            count: 1,
            max_covered_lines: propagate::covered_line_count(arena, tree),
        }
    }

    /// Cost of adding `tree` to this cluster: the existing members'
    /// generalization cost (weighted by how many of them there are) plus
    /// the new tree's own generalization cost. Lower is a better fit.
    ///
    /// Builds a throwaway [`Unifier`] purely to probe the cost; its
    /// generalized tree is discarded (the arena nodes it allocates are not
    /// reclaimed, matching the reference algorithm's own behavior of
    /// constructing and discarding a full `Unifier` per candidate).
    pub fn add_cost(&self, arena: &mut Arena, tree: NodeId) -> Result<f64> {
        let unifier = Unifier::new(arena, self.unifier_tree, tree);
        let cost = self.count as f64 * unifier.sub1.size(arena) + unifier.sub2.size(arena);
        if cost < 0.0 {
            return Err(CloneError::invariant(format!(
                "cluster add-cost must be non-negative, computed {cost}"
            )));
        }
        Ok(cost)
    }

    /// Fold `tree` into this cluster, replacing `unifier_tree` with the
    /// generalization of the old tree and `tree`.
    pub fn unify(&mut self, arena: &mut Arena, tree: NodeId) {
        let unifier = Unifier::new(arena, self.unifier_tree, tree);
        self.unifier_tree = unifier.tree;
        self.count += 1;
        self.members.push(tree);
    }

    /// Record `tree` as a member without touching `unifier_tree`, updating
    /// `max_covered_lines` if `tree` covers more lines than any prior
    /// member.
    pub fn add_without_unification(&mut self, tree: NodeId, covered_lines_count: usize) {
        self.members.push(tree);
        if covered_lines_count > self.max_covered_lines {
            self.max_covered_lines = covered_lines_count;
        }
    }
}

/// First clustering pass: fold each hash bucket's statements into local
/// clusters, merging a statement into its cheapest existing cluster when
/// that cost is at or below `clustering_threshold`, else starting a new
/// singleton cluster.
pub fn build_unifiers(
    arena: &mut Arena,
    hash_to_statements: &IndexMap<u64, Vec<NodeId>>,
    clustering_threshold: f64,
    cluster_ids: &mut ClusterIdSource,
) -> Result<IndexMap<u64, Vec<Cluster>>> {
    let mut buckets: IndexMap<u64, Vec<Cluster>> = IndexMap::new();
    for (&hash, statements) in hash_to_statements {
        let local = buckets.entry(hash).or_default();
        for &statement in statements {
            let mut best: Option<(usize, f64)> = None;
            for (idx, cluster) in local.iter().enumerate() {
                let cost = cluster.add_cost(arena, statement)?;
                let is_better = match best {
                    Some((_, best_cost)) => cost < best_cost,
                    None => true,
                };
                if is_better {
                    best = Some((idx, cost));
                }
            }
            match best {
                Some((idx, cost)) if cost <= clustering_threshold => {
                    local[idx].unify(arena, statement);
                }
                _ => {
                    let id = cluster_ids.next();
                    local.push(Cluster::new_singleton(arena, id, statement));
                }
            }
        }
    }
    Ok(buckets)
}

/// Second clustering pass: re-scan every statement against the clusters
/// [`build_unifiers`] produced for its bucket, marking it with whichever
/// cluster generalizes it most cheaply. Marks (and `max_covered_lines`) are
/// updated every time scanning finds a new minimum, not only once at the
/// end — matching the reference algorithm's interleaved scan-and-commit
/// loop exactly, so a statement's final mark is always its true minimum.
pub fn clusterize(
    arena: &mut Arena,
    hash_to_statements: &IndexMap<u64, Vec<NodeId>>,
    buckets: &mut IndexMap<u64, Vec<Cluster>>,
    marks: &mut Marks,
) -> Result<()> {
    for (hash, statements) in hash_to_statements {
        let local = buckets
            .get_mut(hash)
            .ok_or_else(|| CloneError::invariant("clusterize called on a bucket with no clusters"))?;
        for &statement in statements {
            let mut min_cost = f64::INFINITY;
            for idx in 0..local.len() {
                let unifier_tree = local[idx].unifier_tree;
                let unifier = Unifier::new(arena, unifier_tree, statement);
                let cost = unifier.size(arena);
                if cost < min_cost {
                    min_cost = cost;
                    marks.set(statement, local[idx].id);
                    let covered = propagate::covered_line_count(arena, statement);
                    local[idx].add_without_unification(statement, covered);
                }
            }
        }
    }
    Ok(())
}

/// Hash-only clustering: one cluster per hash bucket, every member marked
/// with it directly, no anti-unification performed at all. Selected by
/// `clusterize_using_hash`.
pub fn mark_using_hash(
    arena: &Arena,
    hash_to_statements: &IndexMap<u64, Vec<NodeId>>,
    cluster_ids: &mut ClusterIdSource,
    marks: &mut Marks,
) -> IndexMap<u64, Cluster> {
    let mut clusters = IndexMap::new();
    for (&hash, statements) in hash_to_statements {
        let id = cluster_ids.next();
        let mut iter = statements.iter();
        let first = match iter.next() {
            Some(&first) => first,
            None => continue,
        };
        let mut cluster = Cluster::new_singleton(arena, id, first);
        marks.set(first, id);
        for &statement in iter {
            let covered = propagate::covered_line_count(arena, statement);
            cluster.add_without_unification(statement, covered);
            marks.set(statement, id);
        }
        clusters.insert(hash, cluster);
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arena::SourceFileId;

    fn stmt(arena: &mut Arena, file: SourceFileId, lit: &str, line: u32) -> NodeId {
        let leaf = arena.leaf(lit, file, line);
        arena.internal("ExprStmt", vec![leaf], true, file, line)
    }

    #[test]
    fn cheap_statement_joins_existing_cluster() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let a = stmt(&mut arena, file, "a", 1);
        let b = stmt(&mut arena, file, "b", 2);

        let mut hash_to_statements = IndexMap::new();
        hash_to_statements.insert(1u64, vec![a, b]);

        let mut ids = ClusterIdSource::new();
        let buckets = build_unifiers(&mut arena, &hash_to_statements, 10.0, &mut ids).unwrap();
        assert_eq!(buckets[&1u64].len(), 1, "both statements fold into one cluster");
    }

    #[test]
    fn expensive_statement_starts_new_cluster() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let a = stmt(&mut arena, file, "a", 1);
        let mut call = arena.internal("Call", vec![], false, file, 2);
        call = arena.internal("ExprStmt", vec![call], true, file, 2);

        let mut hash_to_statements = IndexMap::new();
        hash_to_statements.insert(1u64, vec![a, call]);

        let mut ids = ClusterIdSource::new();
        let buckets = build_unifiers(&mut arena, &hash_to_statements, 0.0, &mut ids).unwrap();
        assert_eq!(buckets[&1u64].len(), 2, "zero threshold forces singleton clusters");
    }

    #[test]
    fn mark_using_hash_marks_every_member() {
        let mut arena = Arena::new();
        let file = arena.add_source_file("a.py");
        let a = stmt(&mut arena, file, "a", 1);
        let b = stmt(&mut arena, file, "b", 2);

        let mut hash_to_statements = IndexMap::new();
        hash_to_statements.insert(7u64, vec![a, b]);

        let mut ids = ClusterIdSource::new();
        let mut marks = Marks::new();
        let clusters = mark_using_hash(&arena, &hash_to_statements, &mut ids, &mut marks);
        assert_eq!(clusters.len(), 1);
        assert_eq!(marks.get(a), marks.get(b));
    }
}
