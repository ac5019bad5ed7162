//! Lineage tracking engine for evolving populations.
//!
//! Callers report each birth (with its parent lineage) and each death; the
//! engine maintains the ancestry graph of taxa, prunes lineages that die
//! out, keeps the most recent common ancestor of the living population up
//! to date, computes phylogenetic statistics and reads/writes CSV snapshots.
//!
//! # Modules
//!
//! - [`taxon`] -- a node of the ancestry graph
//! - [`registry`] -- arena of taxa, lifecycle sets, pruning, shared ancestors
//! - [`position_index`] -- world position to taxon bookkeeping
//! - [`mrca`] -- incremental MRCA cache
//! - [`stats`] -- distances, diversity, distinctiveness, tree shape
//! - [`snapshot`] -- CSV snapshot writer and loader
//! - [`systematics`] -- the [`Systematics`] manager tying it together
//! - [`config`] -- retention flags and their YAML loader
//! - [`error`] -- [`SystematicsError`]
//!
//! # Example
//!
//! ```
//! use phylotrack_core::{Systematics, SystematicsConfig};
//!
//! # fn main() -> Result<(), phylotrack_core::SystematicsError> {
//! let mut sys: Systematics<u32> = Systematics::raw(SystematicsConfig::default());
//! let root = sys.add_org(&1, None)?;
//! sys.set_update(5);
//! let child = sys.add_org(&2, Some(root))?;
//! assert_eq!(sys.shared_ancestor(root, child)?, Some(root));
//! assert_eq!(sys.pairwise_distance(root, child, false)?, 5.0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod mrca;
pub mod position_index;
pub mod registry;
pub mod snapshot;
pub mod stats;
pub mod systematics;
pub mod taxon;

pub use config::{ConfigError, RetentionPolicy, SystematicsConfig};
pub use error::SystematicsError;
pub use mrca::MrcaTracker;
pub use phylotrack_types::{CURRENT_POPULATION, NEXT_POPULATION, TaxonId, WorldPosition};
pub use position_index::PositionIndex;
pub use registry::{LifecycleObserver, TaxonRegistry};
pub use snapshot::{LoadOptions, SnapshotColumn, SnapshotEncoder, encode_info};
pub use stats::DistanceMetric;
pub use systematics::{InfoFn, NewTaxonHook, Systematics, TaxonHook};
pub use taxon::Taxon;
