//! Profiling binary for the phylotrack lineage tracker.
//!
//! Drives [`phylotrack_core::Systematics`] with a synthetic population
//! under selection and mutation, logs phylogeny statistics along the way
//! and writes the final phylogeny plus a timing summary.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Parse the command line (`--config <path>`, default
//!    `phylotrack-profile.yaml`)
//! 3. Load the `systematics` and `run` sections
//! 4. Create the tracker with an `info` snapshot column
//! 5. Seed the population and run the generations
//! 6. Write `phylogeny.csv` and `summary.json` to the output directory
//! 7. Log the result

mod cli;
mod config;
mod error;
mod evolve;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::Parser;
use phylotrack_core::{Systematics, encode_info};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::ProfileConfig;
use crate::error::ProfileError;
use crate::evolve::{Genotype, RunSummary};

/// File name of the phylogeny snapshot inside the output directory.
const SNAPSHOT_FILE: &str = "phylogeny.csv";

/// File name of the run summary inside the output directory.
const SUMMARY_FILE: &str = "summary.json";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the tracker rejects
/// an operation, or the output files cannot be written.
fn main() -> Result<(), ProfileError> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("phylotrack profiler starting");

    // 2-3. Load configuration.
    let cli = Cli::parse();
    let config = ProfileConfig::load(&cli.config)?;
    info!(
        population = config.run.population_size,
        generations = config.run.generations,
        mutation_rate = config.run.mutation_rate,
        seed = config.run.seed,
        store_ancestors = config.systematics.store_ancestors,
        store_outside = config.systematics.store_outside,
        "Configuration loaded"
    );

    // 4. Create the tracker.
    let mut sys: Systematics<Genotype> = Systematics::raw(config.systematics);
    sys.add_snapshot_fun(encode_info, "info");

    // 5. Run.
    let summary = evolve::run(&mut sys, &config.run)?;

    // 6. Write outputs.
    let output_dir = config.run.output_dir.as_path();
    std::fs::create_dir_all(output_dir)?;
    let rows = sys.snapshot(&output_dir.join(SNAPSHOT_FILE))?;
    write_summary(&output_dir.join(SUMMARY_FILE), &summary)?;

    // 7. Log the result.
    info!(
        generations = summary.generations,
        elapsed_seconds = summary.elapsed_seconds,
        generations_per_second = summary.generations_per_second,
        active = summary.active_taxa,
        ancestors = summary.ancestor_taxa,
        snapshot_rows = rows,
        output_dir = %output_dir.display(),
        "Profiling run complete"
    );

    Ok(())
}

/// Write the run summary as pretty-printed JSON.
fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), ProfileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use phylotrack_core::SystematicsConfig;

    use super::*;
    use crate::config::RunConfig;

    #[test]
    fn outputs_are_written_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunConfig {
            population_size: 20,
            generations: 10,
            report_every: 0,
            ..RunConfig::default()
        };
        let mut sys: Systematics<Genotype> = Systematics::raw(SystematicsConfig::default());
        sys.add_snapshot_fun(encode_info, "info");
        let summary = evolve::run(&mut sys, &run).unwrap();

        let summary_path = dir.path().join(SUMMARY_FILE);
        write_summary(&summary_path, &summary).unwrap();
        let text = std::fs::read_to_string(&summary_path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json.get("generations"), Some(&serde_json::json!(10)));
        assert_eq!(json.get("population_size"), Some(&serde_json::json!(20)));

        let rows = sys.snapshot(&dir.path().join(SNAPSHOT_FILE)).unwrap();
        assert_eq!(rows, sys.num_taxa());
    }
}
