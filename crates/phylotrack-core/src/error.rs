//! Error types for the phylotrack-core crate.
//!
//! Every fallible engine operation returns [`SystematicsError`]. Conditions
//! that are expected during normal use (no common ancestor, disjoint
//! lineages) are reported as `None` by the query itself and never surface
//! here.

use phylotrack_types::{TaxonId, WorldPosition};

/// Errors that can occur while tracking, querying, saving or loading a
/// phylogeny.
#[derive(Debug, thiserror::Error)]
pub enum SystematicsError {
    /// The operation referenced a taxon or position the engine does not
    /// track, or asked for something the referenced taxon cannot do (e.g.
    /// removing an organism from a taxon that has none left).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Description of the rejected argument.
        reason: String,
    },

    /// The operation is not available under the current configuration.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Description of the configuration that forbids the operation.
        reason: String,
    },

    /// A snapshot file is malformed or incomplete.
    #[error("snapshot format error: {reason}")]
    Format {
        /// Description of what is wrong with the file.
        reason: String,
    },

    /// Reading or writing a snapshot file failed.
    #[error("snapshot I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl SystematicsError {
    /// An [`InvalidArgument`](Self::InvalidArgument) for an id the registry
    /// does not hold.
    pub fn unknown_taxon(id: TaxonId) -> Self {
        Self::InvalidArgument {
            reason: format!("taxon {id} is not tracked"),
        }
    }

    /// An [`InvalidArgument`](Self::InvalidArgument) for an empty slot.
    pub fn empty_position(position: WorldPosition) -> Self {
        Self::InvalidArgument {
            reason: format!("no organism is tracked at position {position}"),
        }
    }

    /// A [`Format`](Self::Format) error tagged with the offending file line.
    pub fn format_at(line: Option<u64>, reason: impl core::fmt::Display) -> Self {
        let reason = match line {
            Some(line) => format!("line {line}: {reason}"),
            None => reason.to_string(),
        };
        Self::Format { reason }
    }
}

impl From<csv::Error> for SystematicsError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(source) => Self::Io { source },
                other => Self::Format {
                    reason: format!("{other:?}"),
                },
            }
        } else {
            let line = err.position().map(csv::Position::line);
            Self::format_at(line, err)
        }
    }
}
