//! Mapping from world positions to the taxa of the organisms occupying them.
//!
//! Only used when position tracking is enabled. The index keeps a reverse
//! map from taxon to its occupied positions so that a pruned taxon can be
//! released from every slot without scanning the whole world.

use std::collections::{BTreeMap, BTreeSet};

use phylotrack_types::{TaxonId, WorldPosition};

/// Position → taxon bookkeeping with a taxon → positions reverse map.
#[derive(Debug, Clone, Default)]
pub struct PositionIndex {
    occupants: BTreeMap<WorldPosition, TaxonId>,
    by_taxon: BTreeMap<TaxonId, BTreeSet<WorldPosition>>,
}

impl PositionIndex {
    /// Create an empty index.
    pub const fn new() -> Self {
        Self {
            occupants: BTreeMap::new(),
            by_taxon: BTreeMap::new(),
        }
    }

    /// Taxon occupying `pos`, if any.
    pub fn get(&self, pos: WorldPosition) -> Option<TaxonId> {
        self.occupants.get(&pos).copied()
    }

    /// Whether `pos` is occupied.
    pub fn is_occupied(&self, pos: WorldPosition) -> bool {
        self.occupants.contains_key(&pos)
    }

    /// Number of occupied positions.
    pub fn len(&self) -> usize {
        self.occupants.len()
    }

    /// Whether no position is occupied.
    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    /// Positions currently held by `taxon`.
    pub fn positions_of(&self, taxon: TaxonId) -> impl Iterator<Item = WorldPosition> + '_ {
        self.by_taxon.get(&taxon).into_iter().flatten().copied()
    }

    /// Record `taxon` at `pos`. Returns the previous occupant, whose entry is
    /// overwritten.
    pub fn place(&mut self, pos: WorldPosition, taxon: TaxonId) -> Option<TaxonId> {
        let previous = self.occupants.insert(pos, taxon);
        if let Some(old) = previous {
            self.unlink(old, pos);
        }
        self.by_taxon.entry(taxon).or_default().insert(pos);
        previous
    }

    /// Clear `pos`, returning the taxon that occupied it.
    pub fn vacate(&mut self, pos: WorldPosition) -> Option<TaxonId> {
        let taxon = self.occupants.remove(&pos)?;
        self.unlink(taxon, pos);
        Some(taxon)
    }

    /// Exchange the occupants of two positions. Either may be empty.
    pub fn swap(&mut self, a: WorldPosition, b: WorldPosition) {
        if a == b {
            return;
        }
        let at_a = self.vacate(a);
        let at_b = self.vacate(b);
        if let Some(taxon) = at_b {
            self.place(a, taxon);
        }
        if let Some(taxon) = at_a {
            self.place(b, taxon);
        }
    }

    /// Drop every position still pointing at `taxon`. Returns how many were
    /// released.
    pub fn release_taxon(&mut self, taxon: TaxonId) -> usize {
        let Some(positions) = self.by_taxon.remove(&taxon) else {
            return 0;
        };
        for pos in &positions {
            self.occupants.remove(pos);
        }
        positions.len()
    }

    /// Remove and return every occupied position of population `pop_id`, in
    /// index order.
    pub fn drain_population(&mut self, pop_id: usize) -> Vec<(WorldPosition, TaxonId)> {
        let drained: Vec<(WorldPosition, TaxonId)> = self
            .occupants
            .iter()
            .filter(|(pos, _)| pos.pop_id() == pop_id)
            .map(|(&pos, &taxon)| (pos, taxon))
            .collect();
        for &(pos, taxon) in &drained {
            self.occupants.remove(&pos);
            self.unlink(taxon, pos);
        }
        drained
    }

    /// Forget every position.
    pub fn clear(&mut self) {
        self.occupants.clear();
        self.by_taxon.clear();
    }

    fn unlink(&mut self, taxon: TaxonId, pos: WorldPosition) {
        if let Some(set) = self.by_taxon.get_mut(&taxon) {
            set.remove(&pos);
            if set.is_empty() {
                self.by_taxon.remove(&taxon);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(index: usize, pop_id: usize) -> WorldPosition {
        WorldPosition::new(index, pop_id)
    }

    #[test]
    fn place_overwrites_previous_occupant() {
        let mut index = PositionIndex::new();
        assert_eq!(index.place(pos(0, 0), TaxonId(1)), None);
        assert_eq!(index.place(pos(0, 0), TaxonId(2)), Some(TaxonId(1)));
        assert_eq!(index.get(pos(0, 0)), Some(TaxonId(2)));
        assert_eq!(index.positions_of(TaxonId(1)).count(), 0);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn swap_moves_into_empty_slot() {
        let mut index = PositionIndex::new();
        index.place(pos(0, 0), TaxonId(1));
        index.swap(pos(0, 0), pos(5, 0));
        assert!(!index.is_occupied(pos(0, 0)));
        assert_eq!(index.get(pos(5, 0)), Some(TaxonId(1)));
    }

    #[test]
    fn swap_exchanges_two_occupants() {
        let mut index = PositionIndex::new();
        index.place(pos(0, 0), TaxonId(1));
        index.place(pos(1, 0), TaxonId(2));
        index.swap(pos(0, 0), pos(1, 0));
        assert_eq!(index.get(pos(0, 0)), Some(TaxonId(2)));
        assert_eq!(index.get(pos(1, 0)), Some(TaxonId(1)));
    }

    #[test]
    fn release_taxon_clears_all_its_slots() {
        let mut index = PositionIndex::new();
        index.place(pos(0, 0), TaxonId(1));
        index.place(pos(1, 0), TaxonId(1));
        index.place(pos(2, 0), TaxonId(2));
        assert_eq!(index.release_taxon(TaxonId(1)), 2);
        assert_eq!(index.len(), 1);
        assert_eq!(index.release_taxon(TaxonId(1)), 0);
    }

    #[test]
    fn drain_population_only_touches_that_population() {
        let mut index = PositionIndex::new();
        index.place(pos(0, 0), TaxonId(1));
        index.place(pos(0, 1), TaxonId(2));
        index.place(pos(1, 1), TaxonId(3));
        let drained = index.drain_population(1);
        assert_eq!(drained, vec![(pos(0, 1), TaxonId(2)), (pos(1, 1), TaxonId(3))]);
        assert_eq!(index.len(), 1);
        assert!(index.is_occupied(pos(0, 0)));
    }
}
