//! Phylogenetic statistics over the registry.
//!
//! Every statistic here is a read-only pass over the arena. Unless noted,
//! a statistic over an empty population is `0.0`, and "tree" means the
//! active taxa plus the listed ancestor taxa.
//!
//! # Distances
//!
//! Pairwise distances run through the shared ancestor of the two taxa and
//! come in three flavours, see [`DistanceMetric`]. Taxa whose lineages
//! never meet are infinitely far apart.

use std::collections::BTreeMap;

use phylotrack_types::TaxonId;

use crate::error::SystematicsError;
use crate::registry::TaxonRegistry;
use crate::taxon::Taxon;

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

/// Widen a counter to `f64`. Counters stay far below 2^53.
pub(crate) const fn to_f64(value: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let widened = value as f64;
    widened
}

/// Widen a collection size to `f64`.
pub(crate) const fn count_f64(value: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let widened = value as f64;
    widened
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / count_f64(values.len())
}

/// Population variance.
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let centre = mean(values);
    values.iter().map(|v| (v - centre).powi(2)).sum::<f64>() / count_f64(values.len())
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        match (sorted.get(mid.saturating_sub(1)), sorted.get(mid)) {
            (Some(lo), Some(hi)) => (lo + hi) / 2.0,
            _ => 0.0,
        }
    } else {
        sorted.get(mid).copied().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// DistanceMetric
// ---------------------------------------------------------------------------

/// How the path between two taxa is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Sum of origin-time differences from each taxon up to the shared
    /// ancestor.
    #[default]
    Time,
    /// Number of edges between each taxon and the shared ancestor.
    Edges,
    /// Number of path taxa (shared ancestor excluded) whose out-degree is
    /// not exactly one, so unifurcations do not count.
    Branches,
}

impl DistanceMetric {
    /// [`Edges`](Self::Edges) when `branch_only`, else [`Time`](Self::Time).
    pub const fn from_branch_only(branch_only: bool) -> Self {
        if branch_only { Self::Edges } else { Self::Time }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

impl<I> TaxonRegistry<I> {
    /// Distance between `a` and `b` through their shared ancestor.
    ///
    /// Symmetric and zero for `a == b`. Returns `f64::INFINITY` when the
    /// lineages never meet.
    pub fn pairwise_distance(
        &self,
        a: TaxonId,
        b: TaxonId,
        metric: DistanceMetric,
    ) -> Result<f64, SystematicsError> {
        let Some(shared) = self.shared_ancestor(a, b)? else {
            return Ok(f64::INFINITY);
        };
        let shared = self.require(shared)?;
        let left = self.require(a)?;
        let right = self.require(b)?;
        let distance = match metric {
            DistanceMetric::Time => {
                let up = |taxon: &Taxon<I>| taxon.origin_time().saturating_sub(shared.origin_time());
                to_f64(up(left).saturating_add(up(right)))
            }
            DistanceMetric::Edges => {
                let up = |taxon: &Taxon<I>| taxon.depth().saturating_sub(shared.depth());
                f64::from(up(left).saturating_add(up(right)))
            }
            DistanceMetric::Branches => {
                count_f64(self.branching_steps(a, shared.id()).saturating_add(self.branching_steps(b, shared.id())))
            }
        };
        Ok(distance)
    }

    /// Taxa on the path from `from` up to (not including) `until` whose
    /// out-degree differs from one.
    fn branching_steps(&self, from: TaxonId, until: TaxonId) -> usize {
        let mut steps = 0_usize;
        let mut cursor = Some(from);
        while let Some(current) = cursor {
            if current == until {
                break;
            }
            let Some(taxon) = self.get(current) else {
                break;
            };
            if taxon.num_offspring() != 1 {
                steps = steps.saturating_add(1);
            }
            cursor = taxon.parent();
        }
        steps
    }

    /// Distances between every unordered pair of active taxa.
    ///
    /// `None` when any pair has no shared ancestor.
    pub fn pairwise_distances(&self, metric: DistanceMetric) -> Option<Vec<f64>> {
        let active: Vec<TaxonId> = self.active_ids().iter().copied().collect();
        let mut distances = Vec::new();
        for (i, &a) in active.iter().enumerate() {
            for &b in active.iter().skip(i.saturating_add(1)) {
                let distance = self.pairwise_distance(a, b, metric).ok()?;
                if distance.is_infinite() {
                    return None;
                }
                distances.push(distance);
            }
        }
        Some(distances)
    }

    /// Mean pairwise distance over active taxa.
    pub fn mean_pairwise_distance(&self, metric: DistanceMetric) -> Option<f64> {
        self.pairwise_distances(metric).map(|d| mean(&d))
    }

    /// Sum of pairwise distances over active taxa.
    pub fn sum_pairwise_distance(&self, metric: DistanceMetric) -> Option<f64> {
        self.pairwise_distances(metric).map(|d| d.iter().sum())
    }

    /// Population variance of pairwise distances over active taxa.
    pub fn variance_pairwise_distance(&self, metric: DistanceMetric) -> Option<f64> {
        self.pairwise_distances(metric).map(|d| variance(&d))
    }

    /// Mean origin time over the tree.
    ///
    /// With `normalize`, each taxon with out-degree `k > 1` is weighted by
    /// `k - 1` and all other taxa are ignored, which corrects for the
    /// number of branching events a taxon represents. `0.0` when no taxon
    /// qualifies.
    pub fn average_origin_time(&self, normalize: bool) -> f64 {
        if !normalize {
            let origins: Vec<f64> = self.tree_taxa().map(|t| to_f64(t.origin_time())).collect();
            return mean(&origins);
        }
        let mut weighted = 0.0_f64;
        let mut weight = 0_usize;
        for taxon in self.tree_taxa() {
            let branches = taxon.num_offspring();
            if branches > 1 {
                let extra = branches.saturating_sub(1);
                weighted = to_f64(taxon.origin_time()).mul_add(count_f64(extra), weighted);
                weight = weight.saturating_add(extra);
            }
        }
        if weight == 0 {
            return 0.0;
        }
        weighted / count_f64(weight)
    }

    /// Shannon entropy (base 2) of organism counts across active taxa.
    pub fn diversity(&self) -> f64 {
        let counts: Vec<u64> = self.active_taxa().map(Taxon::num_orgs).collect();
        let total = counts.iter().fold(0_u64, |acc, &n| acc.saturating_add(n));
        if counts.len() < 2 || total == 0 {
            return 0.0;
        }
        let total = to_f64(total);
        counts
            .iter()
            .filter(|&&n| n > 0)
            .map(|&n| {
                let p = to_f64(n) / total;
                -p * p.log2()
            })
            .sum()
    }

    /// Histogram of out-degree over the tree: degree → number of taxa.
    pub fn out_degree_distribution(&self) -> BTreeMap<usize, usize> {
        let mut distribution = BTreeMap::new();
        for taxon in self.tree_taxa() {
            let slot = distribution.entry(taxon.num_offspring()).or_insert(0_usize);
            *slot = slot.saturating_add(1);
        }
        distribution
    }

    /// Fair-proportion evolutionary distinctiveness of every active taxon
    /// at `time_point`.
    ///
    /// A taxon's score is its own stretch `time_point - origin_time` plus,
    /// for each edge above it, the edge length divided by the number of
    /// active taxa that share the edge.
    pub fn evolutionary_distinctiveness(&self, time_point: u64) -> BTreeMap<TaxonId, f64> {
        let mut sharing: BTreeMap<TaxonId, usize> = BTreeMap::new();
        for &id in self.active_ids() {
            let mut cursor = Some(id);
            while let Some(current) = cursor {
                let Some(taxon) = self.get(current) else {
                    break;
                };
                let slot = sharing.entry(current).or_insert(0);
                *slot = slot.saturating_add(1);
                cursor = taxon.parent();
            }
        }

        let mut scores = BTreeMap::new();
        for taxon in self.active_taxa() {
            let mut score = to_f64(time_point.saturating_sub(taxon.origin_time()));
            let mut current = taxon;
            while let Some(parent) = current.parent().and_then(|p| self.get(p)) {
                let edge = to_f64(current.origin_time().saturating_sub(parent.origin_time()));
                let shared_by = sharing.get(&current.id()).copied().unwrap_or(1).max(1);
                score += edge / count_f64(shared_by);
                current = parent;
            }
            scores.insert(taxon.id(), score);
        }
        scores
    }

    /// Mean evolutionary distinctiveness over active taxa.
    pub fn mean_evolutionary_distinctiveness(&self, time_point: u64) -> f64 {
        let scores: Vec<f64> = self.evolutionary_distinctiveness(time_point).into_values().collect();
        mean(&scores)
    }

    /// Sum of evolutionary distinctiveness over active taxa.
    pub fn sum_evolutionary_distinctiveness(&self, time_point: u64) -> f64 {
        self.evolutionary_distinctiveness(time_point).into_values().sum()
    }

    /// Population variance of evolutionary distinctiveness.
    pub fn variance_evolutionary_distinctiveness(&self, time_point: u64) -> f64 {
        let scores: Vec<f64> = self.evolutionary_distinctiveness(time_point).into_values().collect();
        variance(&scores)
    }

    /// Mean depth of active taxa.
    pub fn ave_depth(&self) -> f64 {
        let depths: Vec<f64> = self.active_taxa().map(|t| f64::from(t.depth())).collect();
        mean(&depths)
    }

    /// Greatest depth among active taxa, 0 when there are none.
    pub fn max_depth(&self) -> u32 {
        self.active_taxa().map(Taxon::depth).max().unwrap_or(0)
    }

    /// Number of edges in the tree.
    pub fn phylogenetic_diversity(&self) -> usize {
        self.tree_taxa().filter(|t| !t.is_root()).count()
    }

    /// Number of strict ancestors of `id` that have more than one child.
    pub fn branches_to_root(&self, id: TaxonId) -> Result<usize, SystematicsError> {
        let mut branches = 0_usize;
        let mut cursor = self.require(id)?.parent();
        while let Some(current) = cursor {
            let Some(taxon) = self.get(current) else {
                break;
            };
            if taxon.num_offspring() > 1 {
                branches = branches.saturating_add(1);
            }
            cursor = taxon.parent();
        }
        Ok(branches)
    }

    /// Number of edges between `id` and its root.
    pub fn distance_to_root(&self, id: TaxonId) -> Result<u32, SystematicsError> {
        Ok(self.require(id)?.depth())
    }

    /// Sackin index: sum of [`branches_to_root`](Self::branches_to_root)
    /// over the leaves of the tree.
    pub fn sackin_index(&self) -> usize {
        self.tree_taxa()
            .filter(|t| t.is_leaf())
            .filter_map(|t| self.branches_to_root(t.id()).ok())
            .fold(0_usize, usize::saturating_add)
    }

    /// Colless-like balance index (Mir, Rossello and Rotger, 2018).
    ///
    /// Each subtree is weighted by the sum of `ln(k + e)` over its taxa,
    /// `k` being out-degree. Every taxon with two or more children adds the
    /// mean absolute deviation of its children's weights from their median.
    /// Summed over all roots of the forest.
    pub fn colless_like_index(&self) -> f64 {
        let mut order = Vec::new();
        let mut stack: Vec<TaxonId> = self.root_ids().iter().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(taxon) = self.get(id) {
                order.push(id);
                stack.extend(taxon.children().iter().copied());
            }
        }

        let mut weights: BTreeMap<TaxonId, f64> = BTreeMap::new();
        let mut index = 0.0_f64;
        for &id in order.iter().rev() {
            let Some(taxon) = self.get(id) else {
                continue;
            };
            let own = (count_f64(taxon.num_offspring()) + std::f64::consts::E).ln();
            let mut child_weights: Vec<f64> = taxon
                .children()
                .iter()
                .filter_map(|child| weights.get(child).copied())
                .collect();
            if child_weights.len() >= 2 {
                child_weights.sort_by(f64::total_cmp);
                let centre = median(&child_weights);
                let spread: Vec<f64> = child_weights.iter().map(|w| (w - centre).abs()).collect();
                index += mean(&spread);
            }
            weights.insert(id, own + child_weights.iter().sum::<f64>());
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionPolicy;

    fn spawn_at(
        registry: &mut TaxonRegistry<u32>,
        parent: Option<TaxonId>,
        time: u64,
    ) -> Result<TaxonId, SystematicsError> {
        let id = registry.create_taxon(0, parent, time)?;
        registry.add_org_to(id)?;
        Ok(id)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// root(0) -> a(6) -> {c(25), d(32) -> e(32)}, root -> b(10)
    fn worked_tree() -> Result<(TaxonRegistry<u32>, [TaxonId; 6]), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn_at(&mut registry, None, 0)?;
        let a = spawn_at(&mut registry, Some(root), 6)?;
        let b = spawn_at(&mut registry, Some(root), 10)?;
        let c = spawn_at(&mut registry, Some(a), 25)?;
        let d = spawn_at(&mut registry, Some(a), 32)?;
        let e = spawn_at(&mut registry, Some(d), 32)?;
        Ok((registry, [root, a, b, c, d, e]))
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert!(approx(median(&[1.0, 2.0, 9.0]), 2.0));
        assert!(approx(median(&[1.0, 2.0, 4.0, 9.0]), 3.0));
        assert!(approx(median(&[]), 0.0));
    }

    #[test]
    fn distance_metrics_disagree_as_expected() -> Result<(), SystematicsError> {
        let (registry, [root, a, b, _c, _d, e]) = worked_tree()?;
        assert!(approx(registry.pairwise_distance(e, b, DistanceMetric::Time)?, 42.0));
        assert!(approx(registry.pairwise_distance(e, b, DistanceMetric::Edges)?, 4.0));
        assert!(approx(registry.pairwise_distance(e, b, DistanceMetric::Branches)?, 3.0));
        assert!(approx(registry.pairwise_distance(a, root, DistanceMetric::Branches)?, 1.0));
        assert!(approx(registry.pairwise_distance(e, e, DistanceMetric::Time)?, 0.0));
        Ok(())
    }

    #[test]
    fn disconnected_pair_is_infinitely_far() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let a = spawn_at(&mut registry, None, 0)?;
        let b = spawn_at(&mut registry, None, 0)?;
        assert!(registry.pairwise_distance(a, b, DistanceMetric::Time)?.is_infinite());
        assert_eq!(registry.mean_pairwise_distance(DistanceMetric::Time), None);
        Ok(())
    }

    #[test]
    fn pairwise_aggregates_cover_all_pairs() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn_at(&mut registry, None, 0)?;
        spawn_at(&mut registry, Some(root), 1)?;
        spawn_at(&mut registry, Some(root), 1)?;
        // Pairs: (root, x) = 1, (root, y) = 1, (x, y) = 2.
        let sum = registry.sum_pairwise_distance(DistanceMetric::Edges);
        let mean = registry.mean_pairwise_distance(DistanceMetric::Edges);
        let var = registry.variance_pairwise_distance(DistanceMetric::Edges);
        assert!(sum.is_some_and(|s| approx(s, 4.0)));
        assert!(mean.is_some_and(|m| approx(m, 4.0 / 3.0)));
        assert!(var.is_some_and(|v| approx(v, 2.0 / 9.0)));
        Ok(())
    }

    #[test]
    fn tree_shape_measures() -> Result<(), SystematicsError> {
        let (registry, [root, _a, _b, _c, _d, e]) = worked_tree()?;
        assert_eq!(registry.phylogenetic_diversity(), 5);
        assert_eq!(registry.branches_to_root(e)?, 2);
        assert_eq!(registry.branches_to_root(root)?, 0);
        assert_eq!(registry.distance_to_root(e)?, 3);
        // Leaves b, c, e: 1 + 2 + 2.
        assert_eq!(registry.sackin_index(), 5);
        Ok(())
    }

    #[test]
    fn colless_like_is_zero_for_symmetric_trees() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn_at(&mut registry, None, 0)?;
        spawn_at(&mut registry, Some(root), 1)?;
        spawn_at(&mut registry, Some(root), 1)?;
        assert!(approx(registry.colless_like_index(), 0.0));
        Ok(())
    }

    #[test]
    fn colless_like_grows_with_imbalance() -> Result<(), SystematicsError> {
        let (registry, _) = worked_tree()?;
        // Subtree weights: b = 1, a-side = ln(2+e) + ln(e) + ln(1+e) + ln(e).
        let ln_e = 1.0;
        let ln_1e = (1.0 + std::f64::consts::E).ln();
        let ln_2e = (2.0 + std::f64::consts::E).ln();
        let d_subtree = ln_1e + ln_e;
        let a_subtree = ln_2e + ln_e + d_subtree;
        let at_a = (d_subtree - ln_e) / 2.0;
        let at_root = (a_subtree - ln_e) / 2.0;
        assert!(approx(registry.colless_like_index(), at_a + at_root));
        Ok(())
    }

    #[test]
    fn distinctiveness_splits_shared_edges() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn_at(&mut registry, None, 0)?;
        let x = spawn_at(&mut registry, Some(root), 4)?;
        let y = spawn_at(&mut registry, Some(root), 6)?;
        registry.remove_org_from(root, 6, &mut ())?;
        let scores = registry.evolutionary_distinctiveness(10);
        // x: 6 + 4/1, y: 4 + 6/1; the root itself is no longer active.
        assert!(scores.get(&x).is_some_and(|&s| approx(s, 10.0)));
        assert!(scores.get(&y).is_some_and(|&s| approx(s, 10.0)));
        assert!(approx(registry.mean_evolutionary_distinctiveness(10), 10.0));
        assert!(approx(registry.sum_evolutionary_distinctiveness(10), 20.0));
        assert!(approx(registry.variance_evolutionary_distinctiveness(10), 0.0));
        Ok(())
    }

    #[test]
    fn empty_population_has_zero_statistics() {
        let registry = TaxonRegistry::<u32>::new(RetentionPolicy::default());
        assert!(approx(registry.diversity(), 0.0));
        assert!(approx(registry.ave_depth(), 0.0));
        assert_eq!(registry.max_depth(), 0);
        assert!(approx(registry.average_origin_time(false), 0.0));
        assert!(approx(registry.average_origin_time(true), 0.0));
        assert!(approx(registry.mean_evolutionary_distinctiveness(5), 0.0));
        assert_eq!(registry.sum_pairwise_distance(DistanceMetric::Time), Some(0.0));
        assert!(registry.out_degree_distribution().is_empty());
    }
}
