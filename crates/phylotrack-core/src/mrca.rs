//! Incremental most-recent-common-ancestor tracking.
//!
//! The MRCA of the active population only ever moves *up* when organisms
//! are added (a new lineage can only widen the set of active taxa), so
//! additions update the cached value with one shared-ancestor walk.
//! Extinctions can move it *down*; rather than search for the new value on
//! every death the cache is marked stale and recomputed on the next query
//! by descending from the single root through extinct single-child taxa.
//!
//! The cache sits in a [`Cell`] so that queries can refresh it through a
//! shared reference.

use std::cell::Cell;

use phylotrack_types::TaxonId;

use crate::registry::TaxonRegistry;

/// Cached MRCA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MrcaState {
    /// Must be recomputed before use.
    Stale,
    /// Up to date: `None` means there is no common ancestor.
    Known(Option<TaxonId>),
}

/// Lazily refreshed MRCA cache.
#[derive(Debug, Clone)]
pub struct MrcaTracker {
    state: Cell<MrcaState>,
}

impl Default for MrcaTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MrcaTracker {
    /// Create a tracker with nothing cached.
    pub const fn new() -> Self {
        Self {
            state: Cell::new(MrcaState::Stale),
        }
    }

    /// Record that `id` just gained its first organism, either as a new
    /// taxon or by reactivation.
    pub fn on_activated<I>(&self, registry: &TaxonRegistry<I>, id: TaxonId) {
        let next = match self.state.get() {
            MrcaState::Known(Some(current)) => registry
                .shared_ancestor(current, id)
                .map_or(MrcaState::Stale, MrcaState::Known),
            MrcaState::Known(None) | MrcaState::Stale => MrcaState::Stale,
        };
        self.state.set(next);
    }

    /// Forget the cached value.
    pub fn invalidate(&self) {
        self.state.set(MrcaState::Stale);
    }

    /// The MRCA of all active taxa, recomputing it if needed.
    pub fn get<I>(&self, registry: &TaxonRegistry<I>) -> Option<TaxonId> {
        if let MrcaState::Known(known) = self.state.get() {
            return known;
        }
        let resolved = Self::resolve(registry);
        self.state.set(MrcaState::Known(resolved));
        resolved
    }

    fn resolve<I>(registry: &TaxonRegistry<I>) -> Option<TaxonId> {
        if registry.num_active() == 0 || registry.num_roots() != 1 {
            return None;
        }
        let root = registry.root_ids().first().copied()?;
        let mut current = registry.get(root)?;
        while !current.is_active() && current.children().len() == 1 {
            let child = current.children().first().copied()?;
            current = registry.get(child)?;
        }
        Some(current.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetentionPolicy;
    use crate::error::SystematicsError;

    fn spawn(
        registry: &mut TaxonRegistry<u8>,
        tracker: &MrcaTracker,
        parent: Option<TaxonId>,
    ) -> Result<TaxonId, SystematicsError> {
        let id = registry.create_taxon(0, parent, 0)?;
        registry.add_org_to(id)?;
        tracker.on_activated(registry, id);
        Ok(id)
    }

    #[test]
    fn empty_registry_has_no_mrca() {
        let registry = TaxonRegistry::<u8>::new(RetentionPolicy::default());
        assert_eq!(MrcaTracker::new().get(&registry), None);
    }

    #[test]
    fn mrca_moves_up_as_lineages_branch() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let tracker = MrcaTracker::new();
        let root = spawn(&mut registry, &tracker, None)?;
        assert_eq!(tracker.get(&registry), Some(root));

        let a = spawn(&mut registry, &tracker, Some(root))?;
        registry.remove_org_from(root, 1, &mut ())?;
        tracker.invalidate();
        assert_eq!(tracker.get(&registry), Some(a));

        let a1 = spawn(&mut registry, &tracker, Some(a))?;
        let a2 = spawn(&mut registry, &tracker, Some(a))?;
        registry.remove_org_from(a, 2, &mut ())?;
        tracker.invalidate();
        assert_eq!(tracker.get(&registry), Some(a));

        registry.remove_org_from(a2, 3, &mut ())?;
        tracker.invalidate();
        assert_eq!(tracker.get(&registry), Some(a1));
        Ok(())
    }

    #[test]
    fn second_root_clears_mrca() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let tracker = MrcaTracker::new();
        let root = spawn(&mut registry, &tracker, None)?;
        assert_eq!(tracker.get(&registry), Some(root));
        spawn(&mut registry, &tracker, None)?;
        assert_eq!(tracker.get(&registry), None);
        Ok(())
    }

    #[test]
    fn cached_value_matches_fresh_resolution() -> Result<(), SystematicsError> {
        let mut registry = TaxonRegistry::new(RetentionPolicy::default());
        let tracker = MrcaTracker::new();
        let root = spawn(&mut registry, &tracker, None)?;
        let a = spawn(&mut registry, &tracker, Some(root))?;
        let b = spawn(&mut registry, &tracker, Some(a))?;
        let _c = spawn(&mut registry, &tracker, Some(b))?;
        assert_eq!(tracker.get(&registry), Some(root));
        assert_eq!(MrcaTracker::new().get(&registry), Some(root));
        Ok(())
    }
}
