//! Arena of taxa and the lifecycle sets that classify them.
//!
//! # Architecture
//!
//! The registry is the sole owner of every [`Taxon`]. Taxa live in an arena
//! keyed by [`TaxonId`]; parent and child links are ids looked up through
//! the arena, never owning references. On top of the arena the registry
//! keeps four id sets:
//!
//! - `active`: taxa with living organisms (populated when `store_active`)
//! - `ancestors`: extinct taxa that still have retained descendants
//!   (populated when `store_ancestors`)
//! - `outside`: pruned taxa kept for record keeping (when `store_outside`)
//! - `roots`: retained taxa without a parent
//!
//! Extinct taxa with descendants stay in the arena even when
//! `store_ancestors` is off, since the graph needs them as structural links;
//! they are simply not listed.
//!
//! # Pruning
//!
//! When a taxon without children loses its last organism it is pruned:
//! unlinked from its parent and either moved to `outside` or freed. The
//! walk then continues upward while the parent has no organisms and no
//! remaining children. A [`LifecycleObserver`] sees each extinction and
//! each prune as it happens.

use std::collections::{BTreeMap, BTreeSet};

use phylotrack_types::TaxonId;

use crate::config::RetentionPolicy;
use crate::error::SystematicsError;
use crate::taxon::Taxon;

// ---------------------------------------------------------------------------
// LifecycleObserver
// ---------------------------------------------------------------------------

/// Receives lifecycle transitions while the registry performs them.
pub trait LifecycleObserver<I> {
    /// A taxon lost its last organism.
    fn on_extinct(&mut self, _taxon: &Taxon<I>) {}

    /// A taxon is about to be unlinked from the graph.
    fn on_prune(&mut self, _taxon: &Taxon<I>) {}
}

impl<I> LifecycleObserver<I> for () {}

// ---------------------------------------------------------------------------
// TaxonRegistry
// ---------------------------------------------------------------------------

/// Owner of all taxa and of the active/ancestor/outside/root sets.
#[derive(Debug, Clone)]
pub struct TaxonRegistry<I> {
    /// Every retained taxon, including hidden structural ancestors.
    taxa: BTreeMap<TaxonId, Taxon<I>>,
    active: BTreeSet<TaxonId>,
    ancestors: BTreeSet<TaxonId>,
    outside: BTreeSet<TaxonId>,
    roots: BTreeSet<TaxonId>,
    /// Id handed to the next created taxon.
    next_id: TaxonId,
    policy: RetentionPolicy,
}

impl<I> TaxonRegistry<I> {
    /// Create an empty registry with the given retention policy.
    pub const fn new(policy: RetentionPolicy) -> Self {
        Self {
            taxa: BTreeMap::new(),
            active: BTreeSet::new(),
            ancestors: BTreeSet::new(),
            outside: BTreeSet::new(),
            roots: BTreeSet::new(),
            next_id: TaxonId::FIRST,
            policy,
        }
    }

    /// The retention policy fixed at construction.
    pub const fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    // -- lookup -----------------------------------------------------------

    /// Look up a taxon by id.
    pub fn get(&self, id: TaxonId) -> Option<&Taxon<I>> {
        self.taxa.get(&id)
    }

    /// Look up a taxon, failing with `InvalidArgument` for unknown ids.
    pub fn require(&self, id: TaxonId) -> Result<&Taxon<I>, SystematicsError> {
        self.taxa
            .get(&id)
            .ok_or_else(|| SystematicsError::unknown_taxon(id))
    }

    fn require_mut(&mut self, id: TaxonId) -> Result<&mut Taxon<I>, SystematicsError> {
        self.taxa
            .get_mut(&id)
            .ok_or_else(|| SystematicsError::unknown_taxon(id))
    }

    /// Whether the registry holds `id`.
    pub fn contains(&self, id: TaxonId) -> bool {
        self.taxa.contains_key(&id)
    }

    /// Every taxon held in the arena, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Taxon<I>> {
        self.taxa.values()
    }

    /// Ids of active taxa.
    pub const fn active_ids(&self) -> &BTreeSet<TaxonId> {
        &self.active
    }

    /// Ids of listed ancestor taxa.
    pub const fn ancestor_ids(&self) -> &BTreeSet<TaxonId> {
        &self.ancestors
    }

    /// Ids of outside taxa.
    pub const fn outside_ids(&self) -> &BTreeSet<TaxonId> {
        &self.outside
    }

    /// Ids of root taxa.
    pub const fn root_ids(&self) -> &BTreeSet<TaxonId> {
        &self.roots
    }

    /// Ids of the retained tree (active and ancestor taxa), in id order.
    pub fn tree_ids(&self) -> impl Iterator<Item = TaxonId> + '_ {
        self.active.union(&self.ancestors).copied()
    }

    /// Active taxa, in id order.
    pub fn active_taxa(&self) -> impl Iterator<Item = &Taxon<I>> {
        self.active.iter().filter_map(|id| self.taxa.get(id))
    }

    /// Taxa of the retained tree, in id order.
    pub fn tree_taxa(&self) -> impl Iterator<Item = &Taxon<I>> {
        self.tree_ids().filter_map(|id| self.taxa.get(&id))
    }

    // -- counts -----------------------------------------------------------

    /// Number of active taxa.
    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    /// Number of listed ancestor taxa.
    pub fn num_ancestors(&self) -> usize {
        self.ancestors.len()
    }

    /// Number of outside taxa.
    pub fn num_outside(&self) -> usize {
        self.outside.len()
    }

    /// Number of roots.
    pub fn num_roots(&self) -> usize {
        self.roots.len()
    }

    /// Active + ancestor taxa.
    pub fn tree_size(&self) -> usize {
        self.active.len().saturating_add(self.ancestors.len())
    }

    /// Active + ancestor + outside taxa.
    pub fn num_taxa(&self) -> usize {
        self.tree_size().saturating_add(self.outside.len())
    }

    /// Organisms currently alive across all taxa.
    pub fn total_orgs(&self) -> u64 {
        self.taxa
            .values()
            .fold(0_u64, |acc, taxon| acc.saturating_add(taxon.num_orgs()))
    }

    /// Id the next created taxon will receive.
    pub const fn next_id(&self) -> TaxonId {
        self.next_id
    }

    // -- mutation ---------------------------------------------------------

    /// Create a taxon with no organisms under `parent` (or as a new root).
    ///
    /// Every ancestor of the new taxon has its `total_offspring` bumped.
    pub(crate) fn create_taxon(
        &mut self,
        info: I,
        parent: Option<TaxonId>,
        origin_time: u64,
    ) -> Result<TaxonId, SystematicsError> {
        let depth = match parent {
            Some(parent_id) => {
                if self.outside.contains(&parent_id) {
                    return Err(SystematicsError::InvalidArgument {
                        reason: format!("taxon {parent_id} has been pruned and cannot gain offspring"),
                    });
                }
                self.require(parent_id)?.depth().saturating_add(1)
            }
            None => 0,
        };

        let id = self.next_id;
        self.next_id = id.next();
        self.taxa
            .insert(id, Taxon::with_lineage(id, info, parent, depth, origin_time));

        match parent {
            Some(parent_id) => {
                if let Some(parent_taxon) = self.taxa.get_mut(&parent_id) {
                    parent_taxon.add_child(id);
                }
                let mut cursor = Some(parent_id);
                while let Some(ancestor_id) = cursor {
                    let Some(ancestor) = self.taxa.get_mut(&ancestor_id) else {
                        break;
                    };
                    ancestor.add_total_offspring();
                    cursor = ancestor.parent();
                }
            }
            None => {
                self.roots.insert(id);
            }
        }

        tracing::debug!(taxon = %id, parent = ?parent.map(TaxonId::into_inner), depth, "taxon created");
        Ok(id)
    }

    /// Add one organism to `id`. Returns `true` when the taxon had no
    /// organisms before the call (newly created or reactivated).
    pub(crate) fn add_org_to(&mut self, id: TaxonId) -> Result<bool, SystematicsError> {
        if self.outside.contains(&id) {
            return Err(SystematicsError::InvalidArgument {
                reason: format!("taxon {id} has been pruned and cannot gain organisms"),
            });
        }
        let taxon = self.require_mut(id)?;
        let was_inactive = !taxon.is_active();
        taxon.add_org();
        if was_inactive {
            self.ancestors.remove(&id);
            if self.policy.store_active {
                self.active.insert(id);
            }
        }
        Ok(was_inactive)
    }

    /// Remove one organism from `id`. Returns `true` when this drives the
    /// taxon's organism count to zero, in which case the taxon is marked
    /// extinct at `update` and pruned if it has no children.
    pub(crate) fn remove_org_from<O: LifecycleObserver<I>>(
        &mut self,
        id: TaxonId,
        update: u64,
        observer: &mut O,
    ) -> Result<bool, SystematicsError> {
        let taxon = self.require_mut(id)?;
        if !taxon.is_active() {
            return Err(SystematicsError::InvalidArgument {
                reason: format!("taxon {id} has no organisms left to remove"),
            });
        }
        if !taxon.remove_org() {
            return Ok(false);
        }
        self.mark_extinct(id, update, observer);
        Ok(true)
    }

    fn mark_extinct<O: LifecycleObserver<I>>(&mut self, id: TaxonId, update: u64, observer: &mut O) {
        let Some(taxon) = self.taxa.get_mut(&id) else {
            return;
        };
        taxon.set_destruction_time(Some(update));
        self.active.remove(&id);
        observer.on_extinct(taxon);
        tracing::debug!(taxon = %id, update, "taxon extinct");

        if taxon.is_leaf() {
            self.prune(id, observer);
        } else if self.policy.store_ancestors {
            self.ancestors.insert(id);
        }
    }

    /// Unlink `id` and every ancestor that becomes empty as a result.
    fn prune<O: LifecycleObserver<I>>(&mut self, id: TaxonId, observer: &mut O) {
        let mut cursor = Some(id);
        while let Some(current) = cursor.take() {
            let Some(taxon) = self.taxa.get(&current) else {
                break;
            };
            observer.on_prune(taxon);
            let parent = taxon.parent();
            self.ancestors.remove(&current);
            self.roots.remove(&current);
            if self.policy.store_outside {
                self.outside.insert(current);
            } else {
                self.taxa.remove(&current);
            }
            tracing::debug!(taxon = %current, "taxon pruned");

            let Some(parent_id) = parent else {
                break;
            };
            let parent_is_empty = match self.taxa.get_mut(&parent_id) {
                Some(parent_taxon) => {
                    parent_taxon.remove_child(current);
                    !parent_taxon.is_active() && parent_taxon.is_leaf()
                }
                None => false,
            };
            if parent_is_empty && !self.outside.contains(&parent_id) {
                cursor = Some(parent_id);
            }
        }
    }

    /// Free outside taxa whose destruction time is strictly earlier than
    /// `update`. Returns how many were freed.
    ///
    /// A taxon still named as parent by a held taxon is kept, so snapshots
    /// never reference a freed id. Expired chains are freed leaf first.
    pub(crate) fn remove_before(&mut self, update: u64) -> usize {
        let mut freed = 0_usize;
        loop {
            let referenced: BTreeSet<TaxonId> = self.taxa.values().filter_map(Taxon::parent).collect();
            let expired: Vec<TaxonId> = self
                .outside
                .iter()
                .copied()
                .filter(|id| !referenced.contains(id))
                .filter(|id| {
                    self.taxa
                        .get(id)
                        .and_then(Taxon::destruction_time)
                        .is_some_and(|time| time < update)
                })
                .collect();
            if expired.is_empty() {
                return freed;
            }
            for id in &expired {
                self.outside.remove(id);
                self.taxa.remove(id);
            }
            freed = freed.saturating_add(expired.len());
        }
    }

    /// Drop every taxon and restart ids at 1.
    pub(crate) fn clear(&mut self) {
        self.taxa.clear();
        self.active.clear();
        self.ancestors.clear();
        self.outside.clear();
        self.roots.clear();
        self.next_id = TaxonId::FIRST;
    }

    /// Replace the contents with an already linked arena.
    ///
    /// Taxa with organisms become active; ids in `outside` become outside
    /// taxa; every other taxon is an ancestor. Roots are the non-outside
    /// taxa without a parent.
    pub(crate) fn restore(
        &mut self,
        taxa: BTreeMap<TaxonId, Taxon<I>>,
        outside: BTreeSet<TaxonId>,
        next_id: TaxonId,
    ) {
        self.clear();
        for (&id, taxon) in &taxa {
            if outside.contains(&id) {
                continue;
            }
            if taxon.is_root() {
                self.roots.insert(id);
            }
            if taxon.is_active() {
                if self.policy.store_active {
                    self.active.insert(id);
                }
            } else if self.policy.store_ancestors {
                self.ancestors.insert(id);
            }
        }
        self.taxa = taxa;
        self.outside = outside;
        self.next_id = next_id;
    }

    // -- lineage queries --------------------------------------------------

    /// Deepest taxon that is an ancestor-or-self of both `a` and `b`.
    ///
    /// Returns `None` when the lineages never meet (distinct roots or a
    /// lineage whose upper part has been freed).
    pub fn shared_ancestor(&self, a: TaxonId, b: TaxonId) -> Result<Option<TaxonId>, SystematicsError> {
        let mut left = self.require(a)?;
        let mut right = self.require(b)?;

        while left.depth() > right.depth() {
            let Some(next) = self.parent_of(left) else {
                return Ok(None);
            };
            left = next;
        }
        while right.depth() > left.depth() {
            let Some(next) = self.parent_of(right) else {
                return Ok(None);
            };
            right = next;
        }
        while left.id() != right.id() {
            match (self.parent_of(left), self.parent_of(right)) {
                (Some(l), Some(r)) => {
                    left = l;
                    right = r;
                }
                _ => return Ok(None),
            }
        }
        Ok(Some(left.id()))
    }

    fn parent_of(&self, taxon: &Taxon<I>) -> Option<&Taxon<I>> {
        taxon.parent().and_then(|parent| self.taxa.get(&parent))
    }

    /// Ids from `id` up to its root (inclusive at both ends).
    pub fn lineage(&self, id: TaxonId) -> Result<Vec<TaxonId>, SystematicsError> {
        let mut lineage = vec![self.require(id)?.id()];
        let mut cursor = self.taxa.get(&id).and_then(Taxon::parent);
        while let Some(current) = cursor {
            let Some(taxon) = self.taxa.get(&current) else {
                break;
            };
            lineage.push(current);
            cursor = taxon.parent();
        }
        Ok(lineage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        extinct: Vec<TaxonId>,
        pruned: Vec<TaxonId>,
    }

    impl LifecycleObserver<u32> for Recorder {
        fn on_extinct(&mut self, taxon: &Taxon<u32>) {
            self.extinct.push(taxon.id());
        }

        fn on_prune(&mut self, taxon: &Taxon<u32>) {
            self.pruned.push(taxon.id());
        }
    }

    fn spawn(
        registry: &mut TaxonRegistry<u32>,
        info: u32,
        parent: Option<TaxonId>,
    ) -> Result<TaxonId, SystematicsError> {
        let id = registry.create_taxon(info, parent, 0)?;
        registry.add_org_to(id)?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    #[test]
    fn ids_start_at_one_and_increase() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let a = spawn(&mut registry, 1, None)?;
        let b = spawn(&mut registry, 2, Some(a))?;
        assert_eq!(a, TaxonId(1));
        assert_eq!(b, TaxonId(2));
        assert_eq!(registry.next_id(), TaxonId(3));
        Ok(())
    }

    #[test]
    fn creation_updates_depth_and_total_offspring() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn(&mut registry, 1, None)?;
        let mid = spawn(&mut registry, 2, Some(root))?;
        let leaf = spawn(&mut registry, 3, Some(mid))?;
        assert_eq!(registry.get(leaf).map(Taxon::depth), Some(2));
        assert_eq!(registry.get(root).map(Taxon::total_offspring), Some(2));
        assert_eq!(registry.get(mid).map(Taxon::total_offspring), Some(1));
        assert_eq!(registry.num_roots(), 1);
        Ok(())
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let result = registry.create_taxon(1, Some(TaxonId(9)), 0);
        assert!(matches!(result, Err(SystematicsError::InvalidArgument { .. })));
    }

    // -----------------------------------------------------------------------
    // Extinction and pruning
    // -----------------------------------------------------------------------

    #[test]
    fn extinct_parent_with_children_becomes_ancestor() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn(&mut registry, 1, None)?;
        spawn(&mut registry, 2, Some(root))?;
        let mut recorder = Recorder::default();
        assert!(registry.remove_org_from(root, 4, &mut recorder)?);
        assert_eq!(registry.num_active(), 1);
        assert_eq!(registry.num_ancestors(), 1);
        assert_eq!(registry.get(root).and_then(Taxon::destruction_time), Some(4));
        assert_eq!(recorder.extinct, vec![root]);
        assert!(recorder.pruned.is_empty());
        Ok(())
    }

    #[test]
    fn pruning_walks_up_through_empty_ancestors() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn(&mut registry, 1, None)?;
        let mid = spawn(&mut registry, 2, Some(root))?;
        let leaf = spawn(&mut registry, 3, Some(mid))?;
        let other = spawn(&mut registry, 4, Some(root))?;
        let mut recorder = Recorder::default();

        registry.remove_org_from(root, 1, &mut recorder)?;
        registry.remove_org_from(mid, 2, &mut recorder)?;
        assert_eq!(registry.num_ancestors(), 2);

        registry.remove_org_from(leaf, 3, &mut recorder)?;
        assert_eq!(recorder.pruned, vec![leaf, mid]);
        assert!(!registry.contains(mid));
        assert_eq!(registry.num_ancestors(), 1);
        assert_eq!(
            registry.get(root).map(|t| t.children().iter().copied().collect::<Vec<_>>()),
            Some(vec![other])
        );
        Ok(())
    }

    #[test]
    fn store_outside_keeps_pruned_taxa() -> Result<(), SystematicsError> {
        let policy = RetentionPolicy {
            store_outside: true,
            ..RetentionPolicy::default()
        };
        let mut registry = TaxonRegistry::new(policy);
        let root = spawn(&mut registry, 1, None)?;
        registry.remove_org_from(root, 7, &mut ())?;
        assert_eq!(registry.num_outside(), 1);
        assert_eq!(registry.num_roots(), 0);
        assert!(registry.contains(root));

        let orphan = registry.create_taxon(2, Some(root), 8);
        assert!(matches!(orphan, Err(SystematicsError::InvalidArgument { .. })));

        assert_eq!(registry.remove_before(7), 0);
        assert_eq!(registry.remove_before(8), 1);
        assert!(!registry.contains(root));
        Ok(())
    }

    #[test]
    fn remove_before_keeps_parents_of_held_taxa() -> Result<(), SystematicsError> {
        let policy = RetentionPolicy {
            store_outside: true,
            ..RetentionPolicy::default()
        };
        let mut registry = TaxonRegistry::new(policy);
        let root = spawn(&mut registry, 1, None)?;
        let child = spawn(&mut registry, 2, Some(root))?;
        registry.remove_org_from(root, 1, &mut ())?;
        registry.remove_org_from(child, 5, &mut ())?;
        assert_eq!(registry.num_outside(), 2);

        // The root expired first but its child is still held.
        assert_eq!(registry.remove_before(3), 0);
        assert!(registry.contains(root));

        assert_eq!(registry.remove_before(6), 2);
        assert_eq!(registry.num_outside(), 0);
        assert!(registry.iter().next().is_none());
        Ok(())
    }

    #[test]
    fn removal_past_zero_is_rejected() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn(&mut registry, 1, None)?;
        spawn(&mut registry, 2, Some(root))?;
        registry.remove_org_from(root, 0, &mut ())?;
        let again = registry.remove_org_from(root, 0, &mut ());
        assert!(matches!(again, Err(SystematicsError::InvalidArgument { .. })));
        Ok(())
    }

    #[test]
    fn hidden_ancestors_are_kept_but_not_listed() -> Result<(), SystematicsError> {
        let policy = RetentionPolicy {
            store_ancestors: false,
            ..RetentionPolicy::default()
        };
        let mut registry = TaxonRegistry::new(policy);
        let root = spawn(&mut registry, 1, None)?;
        let child = spawn(&mut registry, 2, Some(root))?;
        registry.remove_org_from(root, 1, &mut ())?;
        assert_eq!(registry.num_ancestors(), 0);
        assert!(registry.contains(root));
        assert_eq!(registry.shared_ancestor(child, root)?, Some(root));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lineage queries
    // -----------------------------------------------------------------------

    #[test]
    fn shared_ancestor_is_symmetric_and_deepest() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn(&mut registry, 1, None)?;
        let a = spawn(&mut registry, 2, Some(root))?;
        let a1 = spawn(&mut registry, 3, Some(a))?;
        let a2 = spawn(&mut registry, 4, Some(a))?;
        let b = spawn(&mut registry, 5, Some(root))?;

        assert_eq!(registry.shared_ancestor(a1, a2)?, Some(a));
        assert_eq!(registry.shared_ancestor(a2, a1)?, Some(a));
        assert_eq!(registry.shared_ancestor(a1, b)?, Some(root));
        assert_eq!(registry.shared_ancestor(a1, a1)?, Some(a1));
        assert_eq!(registry.shared_ancestor(a1, a)?, Some(a));
        Ok(())
    }

    #[test]
    fn disjoint_roots_share_nothing() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let a = spawn(&mut registry, 1, None)?;
        let b = spawn(&mut registry, 2, None)?;
        assert_eq!(registry.shared_ancestor(a, b)?, None);
        Ok(())
    }

    #[test]
    fn lineage_runs_to_root() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let root = spawn(&mut registry, 1, None)?;
        let mid = spawn(&mut registry, 2, Some(root))?;
        let leaf = spawn(&mut registry, 3, Some(mid))?;
        assert_eq!(registry.lineage(leaf)?, vec![leaf, mid, root]);
        Ok(())
    }
}
