//! Shared value types for the phylotrack lineage tracker.
//!
//! Types defined here are plain, copyable keys used across the workspace.
//! Neither type owns any graph data; they are looked up through the registry
//! in `phylotrack-core`.
//!
//! # Modules
//!
//! - [`ids`] -- [`TaxonId`], the integer handle of a taxon
//! - [`position`] -- [`WorldPosition`], an (index, population) slot key

pub mod ids;
pub mod position;

pub use ids::TaxonId;
pub use position::{CURRENT_POPULATION, NEXT_POPULATION, WorldPosition};
