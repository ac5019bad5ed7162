//! Slot addresses for organisms tracked by position.
//!
//! A [`WorldPosition`] names a slot (`index`) inside one of possibly several
//! populations (`pop_id`). Worlds with synchronous generations conventionally
//! use population 0 for the generation undergoing selection and population 1
//! for the generation currently being born.

use serde::{Deserialize, Serialize};

/// Population id of the generation currently alive.
pub const CURRENT_POPULATION: usize = 0;

/// Population id of the generation being born in a synchronous world.
pub const NEXT_POPULATION: usize = 1;

/// An (index, population) key identifying an organism's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorldPosition {
    /// Position within the population.
    index: usize,
    /// Which population the slot belongs to.
    pop_id: usize,
}

impl WorldPosition {
    /// Sentinel position that refers to no slot.
    pub const INVALID: Self = Self {
        index: usize::MAX,
        pop_id: 0,
    };

    /// Create a position from a slot index and population id.
    pub const fn new(index: usize, pop_id: usize) -> Self {
        Self { index, pop_id }
    }

    /// Slot index within the population.
    pub const fn index(self) -> usize {
        self.index
    }

    /// Population id.
    pub const fn pop_id(self) -> usize {
        self.pop_id
    }

    /// Whether the slot belongs to the generation that is currently alive.
    ///
    /// Only meaningful for synchronous worlds that follow the 0/1 population
    /// convention.
    pub const fn is_active(self) -> bool {
        self.pop_id == CURRENT_POPULATION
    }

    /// Whether this position refers to an actual slot.
    pub const fn is_valid(self) -> bool {
        self.index != usize::MAX
    }

    /// The same slot moved into another population.
    #[must_use]
    pub const fn with_pop_id(self, pop_id: usize) -> Self {
        Self {
            index: self.index,
            pop_id,
        }
    }
}

impl core::fmt::Display for WorldPosition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.index, self.pop_id)
    }
}

impl From<(usize, usize)> for WorldPosition {
    fn from((index, pop_id): (usize, usize)) -> Self {
        Self::new(index, pop_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_parts() {
        let pos = WorldPosition::new(1, 0);
        assert_eq!(pos.index(), 1);
        assert_eq!(pos.pop_id(), 0);
        assert!(pos.is_active());
        assert!(pos.is_valid());
    }

    #[test]
    fn next_generation_is_not_active() {
        let pos = WorldPosition::new(3, NEXT_POPULATION);
        assert!(!pos.is_active());
        assert_eq!(pos.with_pop_id(CURRENT_POPULATION), WorldPosition::new(3, 0));
    }

    #[test]
    fn sentinel_is_invalid() {
        assert!(!WorldPosition::INVALID.is_valid());
    }

    #[test]
    fn converts_from_tuple() {
        assert_eq!(WorldPosition::from((4, 1)), WorldPosition::new(4, 1));
        assert_eq!(WorldPosition::new(4, 1).to_string(), "(4, 1)");
    }
}
