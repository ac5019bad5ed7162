//! A single node of the ancestry graph.
//!
//! A [`Taxon`] groups every organism that shares one descriptor and arose
//! from one origination event. Taxa are owned by the
//! [`TaxonRegistry`](crate::registry::TaxonRegistry); everything outside the
//! registry refers to them by [`TaxonId`]. Read access is public, mutation
//! is crate-internal so the registry's set invariants cannot be broken from
//! outside.

use std::collections::BTreeSet;

use phylotrack_types::TaxonId;

// ---------------------------------------------------------------------------
// Taxon
// ---------------------------------------------------------------------------

/// One lineage node: a descriptor that arose once, plus its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxon<I> {
    /// Registry-assigned identifier.
    id: TaxonId,
    /// Caller-supplied descriptor.
    info: I,
    /// The taxon this one arose from, absent for roots.
    parent: Option<TaxonId>,
    /// Retained immediate children.
    children: BTreeSet<TaxonId>,
    /// Organisms currently alive in this taxon.
    num_orgs: u64,
    /// Organisms ever assigned to this taxon.
    tot_orgs: u64,
    /// Descendant taxa ever created beneath this taxon.
    total_offspring: u64,
    /// Update at which the taxon arose.
    origin_time: u64,
    /// Update at which the last organism was removed.
    destruction_time: Option<u64>,
    /// Edges between this taxon and its root.
    depth: u32,
}

impl<I> Taxon<I> {
    /// Create a standalone root taxon with no organisms, originating at
    /// update 0.
    pub const fn new(id: TaxonId, info: I) -> Self {
        Self {
            id,
            info,
            parent: None,
            children: BTreeSet::new(),
            num_orgs: 0,
            tot_orgs: 0,
            total_offspring: 0,
            origin_time: 0,
            destruction_time: None,
            depth: 0,
        }
    }

    /// Create a taxon beneath `parent` (or a root when `parent` is `None`).
    pub(crate) const fn with_lineage(
        id: TaxonId,
        info: I,
        parent: Option<TaxonId>,
        depth: u32,
        origin_time: u64,
    ) -> Self {
        Self {
            id,
            info,
            parent,
            children: BTreeSet::new(),
            num_orgs: 0,
            tot_orgs: 0,
            total_offspring: 0,
            origin_time,
            destruction_time: None,
            depth,
        }
    }

    // -- read access ------------------------------------------------------

    /// The taxon's identifier.
    pub const fn id(&self) -> TaxonId {
        self.id
    }

    /// The descriptor shared by the taxon's organisms.
    pub const fn info(&self) -> &I {
        &self.info
    }

    /// The parent taxon, if any.
    pub const fn parent(&self) -> Option<TaxonId> {
        self.parent
    }

    /// Retained immediate children, in id order.
    pub const fn children(&self) -> &BTreeSet<TaxonId> {
        &self.children
    }

    /// Organisms currently alive in the taxon.
    pub const fn num_orgs(&self) -> u64 {
        self.num_orgs
    }

    /// Organisms ever assigned to the taxon.
    pub const fn tot_orgs(&self) -> u64 {
        self.tot_orgs
    }

    /// Number of retained immediate children.
    pub fn num_offspring(&self) -> usize {
        self.children.len()
    }

    /// Descendant taxa ever created beneath the taxon, pruned ones included.
    pub const fn total_offspring(&self) -> u64 {
        self.total_offspring
    }

    /// Update at which the taxon arose.
    pub const fn origin_time(&self) -> u64 {
        self.origin_time
    }

    /// Update at which the taxon went extinct, `None` while it is active.
    pub const fn destruction_time(&self) -> Option<u64> {
        self.destruction_time
    }

    /// Edges between the taxon and its root.
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether any organisms are alive in the taxon.
    pub const fn is_active(&self) -> bool {
        self.num_orgs > 0
    }

    /// Whether the taxon has no parent.
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether the taxon has no retained children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    // -- registry-side mutation -------------------------------------------

    /// Count one more organism. Clears any destruction time.
    pub(crate) const fn add_org(&mut self) {
        self.num_orgs = self.num_orgs.saturating_add(1);
        self.tot_orgs = self.tot_orgs.saturating_add(1);
        self.destruction_time = None;
    }

    /// Count one fewer organism. Returns `true` when the count reaches zero.
    pub(crate) const fn remove_org(&mut self) -> bool {
        self.num_orgs = self.num_orgs.saturating_sub(1);
        self.num_orgs == 0
    }

    pub(crate) fn add_child(&mut self, child: TaxonId) {
        self.children.insert(child);
    }

    pub(crate) fn remove_child(&mut self, child: TaxonId) -> bool {
        self.children.remove(&child)
    }

    pub(crate) const fn add_total_offspring(&mut self) {
        self.total_offspring = self.total_offspring.saturating_add(1);
    }

    pub(crate) const fn set_destruction_time(&mut self, time: Option<u64>) {
        self.destruction_time = time;
    }

    /// Overwrite the counters restored from a snapshot.
    pub(crate) const fn restore_counts(
        &mut self,
        num_orgs: u64,
        tot_orgs: u64,
        total_offspring: u64,
        origin_time: u64,
    ) {
        self.num_orgs = num_orgs;
        self.tot_orgs = tot_orgs;
        self.total_offspring = total_offspring;
        self.origin_time = origin_time;
    }
}
