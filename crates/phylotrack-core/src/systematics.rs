//! The systematics manager: the public face of the lineage tracker.
//!
//! # Architecture
//!
//! [`Systematics`] composes the [`TaxonRegistry`], the optional
//! [`PositionIndex`], the [`MrcaTracker`] and the snapshot codec behind one
//! operation set, and holds the caller-driven update clock. It is a
//! **passive recorder**: the host simulation tells it about births and
//! deaths; it never decides either.
//!
//! Organisms are opaque. A caller-supplied extraction function turns each
//! organism into the descriptor (`I`) stored on its taxon; [`Systematics::raw`]
//! stores a clone of the organism itself.
//!
//! # Coalescing
//!
//! An organism added under a parent taxon whose descriptor equals its own
//! joins that parent taxon instead of founding a new one. Siblings are never
//! searched, and organisms added without a parent always found a new root.
//!
//! # Threading
//!
//! The manager is `Send` but not `Sync`; hosts that share it between threads
//! wrap it in a single `Mutex`.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use phylotrack_types::{CURRENT_POPULATION, NEXT_POPULATION, TaxonId, WorldPosition};

use crate::config::SystematicsConfig;
use crate::error::SystematicsError;
use crate::mrca::MrcaTracker;
use crate::position_index::PositionIndex;
use crate::registry::{LifecycleObserver, TaxonRegistry};
use crate::snapshot::{self, LoadOptions, SnapshotColumn, SnapshotEncoder};
use crate::stats::DistanceMetric;
use crate::taxon::Taxon;

/// Maps an organism to its taxon descriptor.
pub type InfoFn<O, I> = Box<dyn Fn(&O) -> I + Send>;

/// Called with each newly created taxon and the organism that founded it.
pub type NewTaxonHook<O, I> = Box<dyn FnMut(&Taxon<I>, &O) + Send>;

/// Called with a taxon at a lifecycle transition.
pub type TaxonHook<I> = Box<dyn FnMut(&Taxon<I>) + Send>;

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

struct Hooks<O, I> {
    on_new: Option<NewTaxonHook<O, I>>,
    on_extinct: Option<TaxonHook<I>>,
    on_prune: Option<TaxonHook<I>>,
}

impl<O, I> Default for Hooks<O, I> {
    fn default() -> Self {
        Self {
            on_new: None,
            on_extinct: None,
            on_prune: None,
        }
    }
}

/// Forwards registry transitions to the caller's hooks and keeps the
/// position index free of pruned taxa.
struct Notifier<'a, I> {
    on_extinct: &'a mut Option<TaxonHook<I>>,
    on_prune: &'a mut Option<TaxonHook<I>>,
    positions: &'a mut PositionIndex,
}

impl<I> LifecycleObserver<I> for Notifier<'_, I> {
    fn on_extinct(&mut self, taxon: &Taxon<I>) {
        if let Some(hook) = self.on_extinct.as_mut() {
            hook(taxon);
        }
    }

    fn on_prune(&mut self, taxon: &Taxon<I>) {
        if let Some(hook) = self.on_prune.as_mut() {
            hook(taxon);
        }
        let held: Vec<WorldPosition> = self.positions.positions_of(taxon.id()).collect();
        if !held.is_empty() {
            tracing::warn!(taxon = %taxon.id(), positions = ?held, "pruned taxon still held positions");
            self.positions.release_taxon(taxon.id());
        }
    }
}

// ---------------------------------------------------------------------------
// Systematics
// ---------------------------------------------------------------------------

/// Lineage tracker for a population of organisms of type `O` whose taxa are
/// described by values of type `I`.
pub struct Systematics<O, I = O> {
    config: SystematicsConfig,
    registry: TaxonRegistry<I>,
    positions: PositionIndex,
    mrca: MrcaTracker,
    current_update: u64,
    calc_info: InfoFn<O, I>,
    /// Parent used by add calls that name none.
    next_parent: Option<TaxonId>,
    /// Removal deferred until the end of the next add.
    to_be_removed: Option<TaxonId>,
    most_recent: Option<TaxonId>,
    columns: Vec<SnapshotColumn<I>>,
    hooks: Hooks<O, I>,
}

impl<O: Clone + 'static> Systematics<O, O> {
    /// A manager that uses each organism, cloned, as its own descriptor.
    pub fn raw(config: SystematicsConfig) -> Self {
        Self::new(config, O::clone)
    }
}

impl<O, I> Systematics<O, I> {
    /// Create a manager with the given configuration and descriptor
    /// extraction function.
    pub fn new(config: SystematicsConfig, calc_info: impl Fn(&O) -> I + Send + 'static) -> Self {
        Self {
            config,
            registry: TaxonRegistry::new(config.retention()),
            positions: PositionIndex::new(),
            mrca: MrcaTracker::new(),
            current_update: 0,
            calc_info: Box::new(calc_info),
            next_parent: None,
            to_be_removed: None,
            most_recent: None,
            columns: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    // -- configuration ----------------------------------------------------

    /// The configuration fixed at construction.
    pub const fn config(&self) -> &SystematicsConfig {
        &self.config
    }

    /// Replace the descriptor extraction function.
    pub fn set_calc_info_fun(&mut self, calc_info: impl Fn(&O) -> I + Send + 'static) {
        self.calc_info = Box::new(calc_info);
    }

    /// Register a hook run for every newly created taxon.
    pub fn on_new(&mut self, hook: impl FnMut(&Taxon<I>, &O) + Send + 'static) {
        self.hooks.on_new = Some(Box::new(hook));
    }

    /// Register a hook run when a taxon loses its last organism.
    pub fn on_extinct(&mut self, hook: impl FnMut(&Taxon<I>) + Send + 'static) {
        self.hooks.on_extinct = Some(Box::new(hook));
    }

    /// Register a hook run just before a taxon is pruned.
    pub fn on_prune(&mut self, hook: impl FnMut(&Taxon<I>) + Send + 'static) {
        self.hooks.on_prune = Some(Box::new(hook));
    }

    // -- clock ------------------------------------------------------------

    /// Set the current update. Non-decreasing by convention, not enforced.
    pub const fn set_update(&mut self, update: u64) {
        self.current_update = update;
    }

    /// The current update.
    pub const fn current_update(&self) -> u64 {
        self.current_update
    }

    /// Advance the clock by one update.
    ///
    /// Any deferred removal is applied first. With `track_synchronous`,
    /// organisms still in population 0 die and population 1 moves into
    /// population 0.
    pub fn update(&mut self) -> Result<(), SystematicsError> {
        self.flush_pending_removal()?;
        if self.config.track_synchronous {
            for (_, id) in self.positions.drain_population(CURRENT_POPULATION) {
                self.remove_now(id)?;
            }
            for (pos, id) in self.positions.drain_population(NEXT_POPULATION) {
                self.positions.place(pos.with_pop_id(CURRENT_POPULATION), id);
            }
        }
        self.current_update = self.current_update.saturating_add(1);
        Ok(())
    }

    // -- removal ----------------------------------------------------------

    /// Remove one organism from `taxon`.
    ///
    /// Returns `true` exactly when this was the taxon's last organism.
    /// Fails with `InvalidArgument` for untracked taxa and for taxa with no
    /// organisms left.
    pub fn remove_org(&mut self, taxon: TaxonId) -> Result<bool, SystematicsError> {
        self.remove_now(taxon)
    }

    /// Remove one organism from `taxon` at the end of the next add call.
    ///
    /// Used when an organism is replaced by its own offspring, so the
    /// lineage the child attaches to is not pruned first. A second deferred
    /// removal applies the first one immediately.
    pub fn remove_org_after_repro(&mut self, taxon: TaxonId) -> Result<(), SystematicsError> {
        self.defer_removal(taxon)
    }

    /// Remove the organism at `pos`.
    pub fn remove_org_by_position(&mut self, pos: WorldPosition) -> Result<bool, SystematicsError> {
        self.require_positions()?;
        let taxon = self
            .positions
            .vacate(pos)
            .ok_or_else(|| SystematicsError::empty_position(pos))?;
        self.remove_now(taxon)
    }

    /// Vacate `pos` now and remove its organism at the end of the next add.
    pub fn remove_org_by_position_after_repro(&mut self, pos: WorldPosition) -> Result<(), SystematicsError> {
        self.require_positions()?;
        let taxon = self.occupant(pos)?;
        self.defer_removal(taxon)?;
        self.positions.vacate(pos);
        Ok(())
    }

    /// Queue `taxon` for removal, applying any earlier pending removal now.
    /// Rejects the call when the taxon cannot cover both removals.
    fn defer_removal(&mut self, taxon: TaxonId) -> Result<(), SystematicsError> {
        let pending = u64::from(self.to_be_removed == Some(taxon));
        let num_orgs = self.registry.require(taxon)?.num_orgs();
        if num_orgs <= pending {
            return Err(SystematicsError::InvalidArgument {
                reason: format!("taxon {taxon} has no organisms left to remove"),
            });
        }
        if let Some(previous) = self.to_be_removed.take() {
            self.remove_now(previous)?;
        }
        self.to_be_removed = Some(taxon);
        Ok(())
    }

    fn flush_pending_removal(&mut self) -> Result<(), SystematicsError> {
        match self.to_be_removed.take() {
            Some(taxon) => self.remove_now(taxon).map(|_| ()),
            None => Ok(()),
        }
    }

    fn remove_now(&mut self, taxon: TaxonId) -> Result<bool, SystematicsError> {
        let mut notifier = Notifier {
            on_extinct: &mut self.hooks.on_extinct,
            on_prune: &mut self.hooks.on_prune,
            positions: &mut self.positions,
        };
        let extinct = self
            .registry
            .remove_org_from(taxon, self.current_update, &mut notifier)?;
        if extinct {
            self.mrca.invalidate();
        }
        Ok(extinct)
    }

    /// Free outside taxa that went extinct strictly before `update`.
    /// Returns how many were freed.
    pub fn remove_before(&mut self, update: u64) -> usize {
        self.registry.remove_before(update)
    }

    // -- positions --------------------------------------------------------

    fn require_positions(&self) -> Result<(), SystematicsError> {
        if self.config.store_position {
            Ok(())
        } else {
            Err(SystematicsError::InvalidState {
                reason: "position tracking is disabled (store_position = false)".to_owned(),
            })
        }
    }

    fn occupant(&self, pos: WorldPosition) -> Result<TaxonId, SystematicsError> {
        self.positions
            .get(pos)
            .ok_or_else(|| SystematicsError::empty_position(pos))
    }

    /// Taxon of the organism at `pos`, if any.
    pub fn get_taxon_at(&self, pos: WorldPosition) -> Result<Option<TaxonId>, SystematicsError> {
        self.require_positions()?;
        Ok(self.positions.get(pos))
    }

    /// Whether an organism is tracked at `pos`.
    pub fn is_taxon_at(&self, pos: WorldPosition) -> Result<bool, SystematicsError> {
        self.require_positions()?;
        Ok(self.positions.is_occupied(pos))
    }

    /// Exchange the organisms at two positions; either may be empty.
    pub fn swap_positions(&mut self, a: WorldPosition, b: WorldPosition) -> Result<(), SystematicsError> {
        self.require_positions()?;
        self.positions.swap(a, b);
        Ok(())
    }

    /// Use `taxon` as the parent of subsequent add calls that name none.
    /// `None` clears it.
    pub fn set_next_parent(&mut self, taxon: Option<TaxonId>) -> Result<(), SystematicsError> {
        if let Some(id) = taxon {
            self.registry.require(id)?;
        }
        self.next_parent = taxon;
        Ok(())
    }

    /// Use the taxon of the organism at `pos` as the next parent.
    pub fn set_next_parent_by_position(&mut self, pos: WorldPosition) -> Result<(), SystematicsError> {
        self.require_positions()?;
        self.next_parent = Some(self.occupant(pos)?);
        Ok(())
    }

    /// The pending next parent, if any.
    pub const fn next_parent(&self) -> Option<TaxonId> {
        self.next_parent
    }

    // -- snapshots --------------------------------------------------------

    /// Register a custom snapshot column.
    pub fn add_snapshot_fun(
        &mut self,
        encoder: impl Fn(&Taxon<I>) -> String + Send + 'static,
        column_name: impl Into<String>,
    ) {
        let encoder: SnapshotEncoder<I> = Box::new(encoder);
        self.columns.push(SnapshotColumn::new(column_name, encoder));
    }

    /// Write every held taxon to a CSV file at `path`. Returns the number of
    /// rows written.
    pub fn snapshot(&self, path: &Path) -> Result<usize, SystematicsError> {
        snapshot::write_snapshot_file(&self.registry, &self.columns, path)
    }

    /// Replace the phylogeny with the contents of a snapshot file, decoding
    /// descriptors with `decode`. Returns the number of taxa loaded.
    pub fn load_from_file_with(
        &mut self,
        path: &Path,
        options: &LoadOptions,
        decode: impl FnMut(&str) -> Result<I, String>,
    ) -> Result<usize, SystematicsError> {
        let loaded = snapshot::load_into(&mut self.registry, path, options, decode)?;
        self.positions.clear();
        self.next_parent = None;
        self.to_be_removed = None;
        self.most_recent = None;
        self.mrca.invalidate();
        Ok(loaded)
    }

    // -- lookup and counts ------------------------------------------------

    /// The registry backing this manager.
    pub const fn registry(&self) -> &TaxonRegistry<I> {
        &self.registry
    }

    /// Look up a taxon.
    pub fn taxon(&self, id: TaxonId) -> Option<&Taxon<I>> {
        self.registry.get(id)
    }

    /// Active taxa, in id order.
    pub fn active_taxa(&self) -> impl Iterator<Item = &Taxon<I>> {
        self.registry.active_taxa()
    }

    /// Outside taxa, pruned but kept for record keeping, in id order.
    pub fn outside_taxa(&self) -> impl Iterator<Item = &Taxon<I>> {
        self.registry
            .outside_ids()
            .iter()
            .filter_map(|&id| self.registry.get(id))
    }

    /// Listed ancestor taxa, in id order.
    pub fn ancestor_taxa(&self) -> impl Iterator<Item = &Taxon<I>> {
        self.registry
            .ancestor_ids()
            .iter()
            .filter_map(|&id| self.registry.get(id))
    }

    /// Number of active taxa.
    pub fn num_active(&self) -> usize {
        self.registry.num_active()
    }

    /// Number of listed ancestor taxa.
    pub fn num_ancestors(&self) -> usize {
        self.registry.num_ancestors()
    }

    /// Number of outside taxa.
    pub fn num_outside(&self) -> usize {
        self.registry.num_outside()
    }

    /// Number of roots.
    pub fn num_roots(&self) -> usize {
        self.registry.num_roots()
    }

    /// Active + ancestor + outside taxa.
    pub fn num_taxa(&self) -> usize {
        self.registry.num_taxa()
    }

    /// Active + ancestor taxa.
    pub fn tree_size(&self) -> usize {
        self.registry.tree_size()
    }

    /// Organisms currently alive.
    pub fn total_orgs(&self) -> u64 {
        self.registry.total_orgs()
    }

    /// Id the next created taxon will receive.
    pub const fn next_id(&self) -> TaxonId {
        self.registry.next_id()
    }

    /// The most recently created taxon, if it is still held.
    pub fn most_recent(&self) -> Option<TaxonId> {
        self.most_recent.filter(|&id| self.registry.contains(id))
    }

    // -- lineage ----------------------------------------------------------

    /// Most recent common ancestor of all active taxa.
    pub fn mrca(&self) -> Option<TaxonId> {
        self.mrca.get(&self.registry)
    }

    /// Depth of the MRCA.
    pub fn mrca_depth(&self) -> Option<u32> {
        self.mrca().and_then(|id| self.registry.get(id)).map(Taxon::depth)
    }

    /// Deepest taxon that is an ancestor-or-self of both `a` and `b`.
    pub fn shared_ancestor(&self, a: TaxonId, b: TaxonId) -> Result<Option<TaxonId>, SystematicsError> {
        self.registry.shared_ancestor(a, b)
    }

    /// Ids from `taxon` up to its root.
    pub fn lineage(&self, taxon: TaxonId) -> Result<Vec<TaxonId>, SystematicsError> {
        self.registry.lineage(taxon)
    }

    // -- statistics -------------------------------------------------------

    /// Distance between two taxa: summed origin-time differences to their
    /// shared ancestor, or edge count with `branch_only`.
    pub fn pairwise_distance(&self, a: TaxonId, b: TaxonId, branch_only: bool) -> Result<f64, SystematicsError> {
        self.registry
            .pairwise_distance(a, b, DistanceMetric::from_branch_only(branch_only))
    }

    /// Distance between two taxa under an explicit metric.
    pub fn pairwise_distance_by(
        &self,
        a: TaxonId,
        b: TaxonId,
        metric: DistanceMetric,
    ) -> Result<f64, SystematicsError> {
        self.registry.pairwise_distance(a, b, metric)
    }

    /// Distances between all pairs of active taxa; `None` if any pair is
    /// disconnected.
    pub fn pairwise_distances(&self, branch_only: bool) -> Option<Vec<f64>> {
        self.registry
            .pairwise_distances(DistanceMetric::from_branch_only(branch_only))
    }

    /// Mean pairwise distance over active taxa.
    pub fn mean_pairwise_distance(&self, branch_only: bool) -> Option<f64> {
        self.registry
            .mean_pairwise_distance(DistanceMetric::from_branch_only(branch_only))
    }

    /// Sum of pairwise distances over active taxa.
    pub fn sum_pairwise_distance(&self, branch_only: bool) -> Option<f64> {
        self.registry
            .sum_pairwise_distance(DistanceMetric::from_branch_only(branch_only))
    }

    /// Variance of pairwise distances over active taxa.
    pub fn variance_pairwise_distance(&self, branch_only: bool) -> Option<f64> {
        self.registry
            .variance_pairwise_distance(DistanceMetric::from_branch_only(branch_only))
    }

    /// Mean origin time of the tree; see
    /// [`TaxonRegistry::average_origin_time`] for `normalize`.
    pub fn average_origin_time(&self, normalize: bool) -> f64 {
        self.registry.average_origin_time(normalize)
    }

    /// Shannon diversity (bits) of organism counts over active taxa.
    pub fn calc_diversity(&self) -> f64 {
        self.registry.diversity()
    }

    /// Out-degree histogram of the tree.
    pub fn out_degree_distribution(&self) -> BTreeMap<usize, usize> {
        self.registry.out_degree_distribution()
    }

    /// Mean evolutionary distinctiveness at `time_point`.
    pub fn mean_evolutionary_distinctiveness(&self, time_point: u64) -> f64 {
        self.registry.mean_evolutionary_distinctiveness(time_point)
    }

    /// Sum of evolutionary distinctiveness at `time_point`.
    pub fn sum_evolutionary_distinctiveness(&self, time_point: u64) -> f64 {
        self.registry.sum_evolutionary_distinctiveness(time_point)
    }

    /// Variance of evolutionary distinctiveness at `time_point`.
    pub fn variance_evolutionary_distinctiveness(&self, time_point: u64) -> f64 {
        self.registry.variance_evolutionary_distinctiveness(time_point)
    }

    /// Mean depth of active taxa.
    pub fn ave_depth(&self) -> f64 {
        self.registry.ave_depth()
    }

    /// Greatest depth among active taxa.
    pub fn max_depth(&self) -> u32 {
        self.registry.max_depth()
    }

    /// Number of edges in the tree.
    pub fn phylogenetic_diversity(&self) -> usize {
        self.registry.phylogenetic_diversity()
    }

    /// Branching ancestors between `taxon` and its root.
    pub fn branches_to_root(&self, taxon: TaxonId) -> Result<usize, SystematicsError> {
        self.registry.branches_to_root(taxon)
    }

    /// Edges between `taxon` and its root.
    pub fn distance_to_root(&self, taxon: TaxonId) -> Result<u32, SystematicsError> {
        self.registry.distance_to_root(taxon)
    }

    /// Sackin imbalance index of the tree.
    pub fn sackin_index(&self) -> usize {
        self.registry.sackin_index()
    }

    /// Colless-like imbalance index of the tree.
    pub fn colless_like_index(&self) -> f64 {
        self.registry.colless_like_index()
    }
}

impl<O, I: PartialEq> Systematics<O, I> {
    /// Record the birth of `org` under `parent` (or under the pending next
    /// parent when `parent` is `None`).
    ///
    /// Returns the taxon the organism joined. Fails with `InvalidArgument`
    /// when the parent is unknown or pruned.
    pub fn add_org(&mut self, org: &O, parent: Option<TaxonId>) -> Result<TaxonId, SystematicsError> {
        let parent = parent.or(self.next_parent);
        let id = self.attach(org, parent)?;
        self.settle_after_add(id);
        Ok(id)
    }

    /// Record the birth of `org` at `pos`, with the organism at `parent_pos`
    /// as its parent.
    ///
    /// Fails with `InvalidState` when position tracking is off and with
    /// `InvalidArgument` when `parent_pos` is empty. An occupied `pos` is
    /// overwritten.
    pub fn add_org_by_position(
        &mut self,
        org: &O,
        pos: WorldPosition,
        parent_pos: Option<WorldPosition>,
    ) -> Result<TaxonId, SystematicsError> {
        self.require_positions()?;
        let parent = match parent_pos {
            Some(parent_pos) => Some(self.occupant(parent_pos)?),
            None => self.next_parent,
        };
        let id = self.attach(org, parent)?;
        if let Some(previous) = self.positions.place(pos, id) {
            tracing::warn!(%pos, previous = %previous, taxon = %id, "overwrote occupied position");
        }
        self.settle_after_add(id);
        Ok(id)
    }

    /// Apply the deferred removal once the new organism is recorded. The add
    /// has already committed, so a failure here is logged, not returned.
    fn settle_after_add(&mut self, added: TaxonId) {
        if let Err(err) = self.flush_pending_removal() {
            tracing::warn!(taxon = %added, error = %err, "deferred removal failed after add");
        }
    }

    fn attach(&mut self, org: &O, parent: Option<TaxonId>) -> Result<TaxonId, SystematicsError> {
        let info = (self.calc_info)(org);

        if let Some(parent_id) = parent
            && *self.registry.require(parent_id)?.info() == info
        {
            if self.registry.add_org_to(parent_id)? {
                self.mrca.on_activated(&self.registry, parent_id);
            }
            return Ok(parent_id);
        }

        let id = self.registry.create_taxon(info, parent, self.current_update)?;
        self.registry.add_org_to(id)?;
        self.mrca.on_activated(&self.registry, id);
        self.most_recent = Some(id);
        if let Some(hook) = self.hooks.on_new.as_mut()
            && let Some(taxon) = self.registry.get(id)
        {
            hook(taxon, org);
        }
        Ok(id)
    }
}

impl<O, I: FromStr> Systematics<O, I>
where
    I::Err: Display,
{
    /// Replace the phylogeny with the contents of a snapshot file, parsing
    /// descriptors from the configured info column.
    pub fn load_from_file(&mut self, path: &Path, options: &LoadOptions) -> Result<usize, SystematicsError> {
        self.load_from_file_with(path, options, |text| text.parse::<I>().map_err(|err| err.to_string()))
    }
}

impl<O, I: Display> Systematics<O, I> {
    /// Multi-line summary of the population.
    pub fn status_report(&self) -> String {
        let mut report = format!(
            "update {}: {} active, {} ancestors, {} outside, {} roots",
            self.current_update,
            self.num_active(),
            self.num_ancestors(),
            self.num_outside(),
            self.num_roots(),
        );
        match self.mrca().and_then(|id| self.taxon(id)) {
            Some(mrca) => {
                report.push_str(&format!("\nmrca: {} ({}) at depth {}", mrca.id(), mrca.info(), mrca.depth()));
            }
            None => report.push_str("\nmrca: none"),
        }
        for taxon in self.active_taxa() {
            report.push_str(&format!(
                "\n  [{}] {} orgs={} offspring={} depth={}",
                taxon.id(),
                taxon.info(),
                taxon.num_orgs(),
                taxon.num_offspring(),
                taxon.depth(),
            ));
        }
        report
    }

    /// The lineage of `taxon` as `id:info` entries from the taxon up to its
    /// root.
    pub fn lineage_report(&self, taxon: TaxonId) -> Result<String, SystematicsError> {
        let entries: Vec<String> = self
            .lineage(taxon)?
            .into_iter()
            .filter_map(|id| self.taxon(id))
            .map(|t| format!("{}:{}", t.id(), t.info()))
            .collect();
        Ok(entries.join(" <- "))
    }
}

impl<O, I> core::fmt::Debug for Systematics<O, I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Systematics")
            .field("config", &self.config)
            .field("current_update", &self.current_update)
            .field("num_active", &self.registry.num_active())
            .field("num_ancestors", &self.registry.num_ancestors())
            .field("num_outside", &self.registry.num_outside())
            .field("next_parent", &self.next_parent)
            .field("to_be_removed", &self.to_be_removed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn strings() -> Systematics<String> {
        Systematics::raw(SystematicsConfig::default())
    }

    #[test]
    fn matching_parent_descriptor_coalesces() -> Result<(), SystematicsError> {
        let mut sys = strings();
        let a = sys.add_org(&"a".to_owned(), None)?;
        let b = sys.add_org(&"b".to_owned(), Some(a))?;
        let b_again = sys.add_org(&"b".to_owned(), Some(b))?;
        assert_eq!(b, b_again);
        assert_eq!(sys.taxon(b).map(Taxon::num_orgs), Some(2));
        Ok(())
    }

    #[test]
    fn equal_siblings_stay_separate() -> Result<(), SystematicsError> {
        let mut sys = strings();
        let a = sys.add_org(&"a".to_owned(), None)?;
        let b1 = sys.add_org(&"b".to_owned(), Some(a))?;
        let b2 = sys.add_org(&"b".to_owned(), Some(a))?;
        assert_ne!(b1, b2);
        let root2 = sys.add_org(&"a".to_owned(), None)?;
        assert_ne!(a, root2);
        assert_eq!(sys.num_active(), 4);
        Ok(())
    }

    #[test]
    fn next_parent_applies_until_cleared() -> Result<(), SystematicsError> {
        let mut sys = strings();
        let a = sys.add_org(&"a".to_owned(), None)?;
        sys.set_next_parent(Some(a))?;
        let b = sys.add_org(&"b".to_owned(), None)?;
        assert_eq!(sys.taxon(b).and_then(Taxon::parent), Some(a));
        sys.set_next_parent(None)?;
        let c = sys.add_org(&"c".to_owned(), None)?;
        assert!(sys.taxon(c).is_some_and(Taxon::is_root));
        Ok(())
    }

    #[test]
    fn deferred_removal_keeps_parent_for_offspring() -> Result<(), SystematicsError> {
        let mut sys = strings();
        let parent = sys.add_org(&"p".to_owned(), None)?;
        sys.remove_org_after_repro(parent)?;
        assert_eq!(sys.num_active(), 1);
        let child = sys.add_org(&"c".to_owned(), Some(parent))?;
        assert_eq!(sys.num_active(), 1);
        assert_eq!(sys.num_ancestors(), 1);
        assert_eq!(sys.mrca(), Some(child));
        Ok(())
    }

    #[test]
    fn deferred_removal_cannot_overdraw_a_taxon() -> Result<(), SystematicsError> {
        let mut sys = strings();
        let single = sys.add_org(&"s".to_owned(), None)?;
        sys.remove_org_after_repro(single)?;
        let second = sys.remove_org_after_repro(single);
        assert!(matches!(second, Err(SystematicsError::InvalidArgument { .. })));
        assert_eq!(sys.taxon(single).map(Taxon::num_orgs), Some(1));

        let child = sys.add_org(&"c".to_owned(), Some(single))?;
        assert_eq!(sys.taxon(single).map(Taxon::num_orgs), Some(0));
        assert_eq!(sys.taxon(child).and_then(Taxon::parent), Some(single));

        let pair = sys.add_org(&"p".to_owned(), None)?;
        sys.add_org(&"p".to_owned(), Some(pair))?;
        sys.remove_org_after_repro(pair)?;
        sys.remove_org_after_repro(pair)?;
        assert_eq!(sys.taxon(pair).map(Taxon::num_orgs), Some(1));
        Ok(())
    }

    #[test]
    fn committed_add_survives_stale_deferred_removal() -> Result<(), SystematicsError> {
        let mut sys = strings();
        let doomed = sys.add_org(&"d".to_owned(), None)?;
        sys.remove_org_after_repro(doomed)?;
        sys.remove_org(doomed)?;
        assert!(sys.taxon(doomed).is_none());

        let fresh = sys.add_org(&"f".to_owned(), None)?;
        assert_eq!(sys.num_active(), 1);
        assert!(sys.taxon(fresh).is_some_and(Taxon::is_active));
        let next = sys.add_org(&"g".to_owned(), None)?;
        assert_eq!(sys.num_active(), 2);
        assert_ne!(next, fresh);
        Ok(())
    }

    #[test]
    fn hooks_see_lifecycle() -> Result<(), SystematicsError> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut sys = strings();
        let log = Arc::clone(&events);
        sys.on_new(move |taxon, org: &String| {
            if let Ok(mut guard) = log.lock() {
                guard.push(format!("new {} {org}", taxon.id()));
            }
        });
        let log = Arc::clone(&events);
        sys.on_extinct(move |taxon| {
            if let Ok(mut guard) = log.lock() {
                guard.push(format!("extinct {}", taxon.id()));
            }
        });
        let log = Arc::clone(&events);
        sys.on_prune(move |taxon| {
            if let Ok(mut guard) = log.lock() {
                guard.push(format!("prune {}", taxon.id()));
            }
        });

        let a = sys.add_org(&"a".to_owned(), None)?;
        sys.remove_org(a)?;
        let seen = events.lock().map(|guard| guard.clone()).unwrap_or_default();
        assert_eq!(seen, vec!["new 1 a", "extinct 1", "prune 1"]);
        Ok(())
    }

    #[test]
    fn position_operations_require_store_position() {
        let mut sys = strings();
        let result = sys.add_org_by_position(&"a".to_owned(), WorldPosition::new(0, 0), None);
        assert!(matches!(result, Err(SystematicsError::InvalidState { .. })));
        assert!(matches!(
            sys.remove_org_by_position(WorldPosition::new(0, 0)),
            Err(SystematicsError::InvalidState { .. })
        ));
    }

    #[test]
    fn status_and_lineage_reports() -> Result<(), SystematicsError> {
        let mut sys = strings();
        let a = sys.add_org(&"a".to_owned(), None)?;
        let b = sys.add_org(&"b".to_owned(), Some(a))?;
        assert_eq!(sys.lineage_report(b)?, "2:b <- 1:a");
        assert!(sys.status_report().starts_with("update 0: 2 active"));
        Ok(())
    }

    #[test]
    fn manager_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Systematics<String>>();
    }
}
