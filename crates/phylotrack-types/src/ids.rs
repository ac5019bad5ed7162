//! Type-safe identifier for taxa.
//!
//! Taxon identifiers are plain integers handed out by the registry that owns
//! the taxon. They are monotonically increasing within one registry and are
//! never reused, so a higher id always means a more recently created taxon.

use serde::{Deserialize, Serialize};

/// Unique identifier for a taxon (a node in the ancestry graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonId(pub u64);

impl TaxonId {
    /// The first id handed out by a fresh registry.
    pub const FIRST: Self = Self(1);

    /// Return the inner integer value.
    pub const fn into_inner(self) -> u64 {
        self.0
    }

    /// Return the id that follows this one, saturating at `u64::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl core::fmt::Display for TaxonId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaxonId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaxonId> for u64 {
    fn from(id: TaxonId) -> Self {
        id.0
    }
}

impl core::str::FromStr for TaxonId {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}
