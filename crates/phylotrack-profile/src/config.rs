//! Configuration for a profiling run.
//!
//! The YAML file has two optional sections: `systematics` holds the
//! tracker's retention flags and `run` holds the population loop settings.
//! A missing file or a missing section falls back to defaults.

use std::path::{Path, PathBuf};

use phylotrack_core::SystematicsConfig;
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "phylotrack-profile.yaml";

/// Settings of the selection/mutation loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Number of organisms alive in every generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,

    /// Number of generations to run.
    #[serde(default = "default_generations")]
    pub generations: u64,

    /// Probability that an offspring receives a fresh genotype.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,

    /// Upper bound (exclusive) of the genotype space.
    #[serde(default = "default_genotype_space")]
    pub genotype_space: u64,

    /// RNG seed; the same seed reproduces the same phylogeny.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Log tracker statistics every this many generations (0 disables).
    #[serde(default = "default_report_every")]
    pub report_every: u64,

    /// Directory receiving the snapshot and the run summary.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Label copied into the run summary.
    #[serde(default = "default_label")]
    pub label: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            generations: default_generations(),
            mutation_rate: default_mutation_rate(),
            genotype_space: default_genotype_space(),
            seed: default_seed(),
            report_every: default_report_every(),
            output_dir: default_output_dir(),
            label: default_label(),
        }
    }
}

impl RunConfig {
    /// Reject settings the loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Settings`] describing the first bad field.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.population_size == 0 {
            return Err(settings("population_size must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(settings(format!(
                "mutation_rate must lie in [0, 1], got {}",
                self.mutation_rate
            )));
        }
        if self.genotype_space == 0 {
            return Err(settings("genotype_space must be at least 1"));
        }
        Ok(())
    }
}

const fn default_population_size() -> usize {
    1000
}

const fn default_generations() -> u64 {
    500
}

const fn default_mutation_rate() -> f64 {
    0.2
}

const fn default_genotype_space() -> u64 {
    1_000_000
}

const fn default_seed() -> u64 {
    1
}

const fn default_report_every() -> u64 {
    100
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("profile-output")
}

fn default_label() -> String {
    String::from("local")
}

fn settings(message: impl Into<String>) -> ProfileError {
    ProfileError::Settings {
        message: message.into(),
    }
}

// -----------------------------------------------------------------------
// Loading
// -----------------------------------------------------------------------

/// Everything a profiling run needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileConfig {
    /// Tracker retention flags.
    pub systematics: SystematicsConfig,
    /// Loop settings.
    pub run: RunConfig,
}

impl ProfileConfig {
    /// Load from `path`, or use defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if the resulting run settings are invalid.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::parse(&contents)
        } else {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse both sections out of a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed, a section has the wrong
    /// shape, or the run settings are invalid.
    pub fn parse(yaml: &str) -> Result<Self, ProfileError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: serde_yml::Value = serde_yml::from_str(yaml)
            .map_err(|e| settings(format!("failed to parse config YAML: {e}")))?;

        let systematics = match raw.get("systematics") {
            Some(section) => serde_yml::from_value(section.clone())
                .map_err(|e| settings(format!("failed to parse systematics section: {e}")))?,
            None => SystematicsConfig::default(),
        };
        let run: RunConfig = match raw.get("run") {
            Some(section) => serde_yml::from_value(section.clone())
                .map_err(|e| settings(format!("failed to parse run section: {e}")))?,
            None => RunConfig::default(),
        };
        run.validate()?;

        Ok(Self { systematics, run })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = ProfileConfig::parse("").ok();
        assert_eq!(config, Some(ProfileConfig::default()));
    }

    #[test]
    fn sections_are_optional() {
        let config = ProfileConfig::parse("run:\n  population_size: 50\n  seed: 9\n").ok();
        let config = config.unwrap_or_default();
        assert_eq!(config.run.population_size, 50);
        assert_eq!(config.run.seed, 9);
        assert_eq!(config.run.generations, default_generations());
        assert_eq!(config.systematics, SystematicsConfig::default());
    }

    #[test]
    fn systematics_section_is_read() {
        let yaml = "systematics:\n  store_outside: true\n  store_ancestors: false\n";
        let config = ProfileConfig::parse(yaml).unwrap_or_default();
        assert!(config.systematics.store_outside);
        assert!(!config.systematics.store_ancestors);
    }

    #[test]
    fn invalid_run_settings_are_rejected() {
        for yaml in [
            "run:\n  population_size: 0\n",
            "run:\n  mutation_rate: 1.5\n",
            "run:\n  genotype_space: 0\n",
        ] {
            assert!(matches!(
                ProfileConfig::parse(yaml),
                Err(ProfileError::Settings { .. })
            ));
        }
    }
}
