//! Error types for the profiling binary.
//!
//! [`ProfileError`] wraps every failure mode of a profiling run so that
//! `main` can propagate with `?`.

/// Top-level error for the profiling binary.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Loading the `systematics` section failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: phylotrack_core::ConfigError,
    },

    /// The YAML document or its `run` section was invalid.
    #[error("invalid run settings: {message}")]
    Settings {
        /// Description of the problem.
        message: String,
    },

    /// The lineage tracker rejected an operation.
    #[error("systematics error: {source}")]
    Systematics {
        /// The underlying tracker error.
        #[from]
        source: phylotrack_core::SystematicsError,
    },

    /// Creating the output directory or writing a file failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Serializing the run summary failed.
    #[error("summary encoding error: {source}")]
    Summary {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
