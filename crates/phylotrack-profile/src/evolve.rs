//! Synthetic selection/mutation loop.
//!
//! Every generation draws `population_size` parents uniformly with
//! replacement. Each offspring inherits its parent's genotype, or with
//! probability `mutation_rate` a fresh one. Offspring are registered under
//! their parent's taxon, then the whole parent generation is removed.
//! Unmutated offspring coalesce into the parent's taxon, so the tracker
//! sees a realistic mix of new taxa and growing ones.

use std::time::{Duration, Instant};

use phylotrack_core::{Systematics, TaxonId};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::ProfileError;

/// Genotype carried by each synthetic organism and used as its taxon info.
pub type Genotype = u64;

/// Outcome of a profiling run, written next to the snapshot as JSON.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    /// Label from the run settings.
    pub label: String,
    /// RNG seed used.
    pub seed: u64,
    /// Organisms per generation.
    pub population_size: usize,
    /// Generations completed.
    pub generations: u64,
    /// Wall-clock time spent in the loop.
    pub elapsed_seconds: f64,
    /// Generations per second of wall-clock time.
    pub generations_per_second: f64,
    /// Taxa with living organisms at the end.
    pub active_taxa: usize,
    /// Extinct taxa retained as ancestors at the end.
    pub ancestor_taxa: usize,
    /// Taxa ever created.
    pub taxa_created: u64,
    /// Depth of the most recent common ancestor, if one exists.
    pub mrca_depth: Option<u32>,
    /// Shannon diversity of the living population.
    pub diversity: f64,
    /// Mean depth of the active taxa.
    pub ave_depth: f64,
}

/// Run the loop on `sys` and summarize it.
///
/// The tracker's clock advances by one update per generation.
///
/// # Errors
///
/// Propagates tracker errors; these indicate a bookkeeping bug rather than
/// bad input.
pub fn run(
    sys: &mut Systematics<Genotype>,
    config: &RunConfig,
) -> Result<RunSummary, ProfileError> {
    config.validate()?;
    let mut rng = SmallRng::seed_from_u64(config.seed);

    let mut population: Vec<Genotype> = (0..config.population_size)
        .map(|_| rng.random_range(0..config.genotype_space))
        .collect();
    let mut taxa = population
        .iter()
        .map(|genotype| sys.add_org(genotype, None))
        .collect::<Result<Vec<TaxonId>, _>>()?;
    info!(
        population = config.population_size,
        roots = sys.num_roots(),
        "Population seeded"
    );

    let started = Instant::now();
    for generation in 1..=config.generations {
        sys.update()?;

        let mut next_population = Vec::with_capacity(population.len());
        let mut next_taxa = Vec::with_capacity(taxa.len());
        for _ in 0..population.len() {
            let parent = rng.random_range(0..population.len());
            let (Some(&genotype), Some(&parent_taxon)) = (population.get(parent), taxa.get(parent))
            else {
                continue;
            };
            let child = if rng.random_bool(config.mutation_rate) {
                rng.random_range(0..config.genotype_space)
            } else {
                genotype
            };
            next_taxa.push(sys.add_org(&child, Some(parent_taxon))?);
            next_population.push(child);
        }

        for taxon in taxa {
            sys.remove_org(taxon)?;
        }
        population = next_population;
        taxa = next_taxa;

        debug!(generation, active = sys.num_active(), "Generation complete");
        if generation.checked_rem(config.report_every) == Some(0) {
            report(sys, generation);
        }
    }

    Ok(summarize(sys, config, started.elapsed()))
}

fn report(sys: &Systematics<Genotype>, generation: u64) {
    info!(
        generation,
        active = sys.num_active(),
        ancestors = sys.num_ancestors(),
        mrca_depth = ?sys.mrca_depth(),
        diversity = sys.calc_diversity(),
        ave_depth = sys.ave_depth(),
        "Phylogeny statistics"
    );
}

fn summarize(sys: &Systematics<Genotype>, config: &RunConfig, elapsed: Duration) -> RunSummary {
    let seconds = elapsed.as_secs_f64();
    #[allow(clippy::cast_precision_loss)]
    let generations = config.generations as f64;
    let generations_per_second = if seconds > 0.0 {
        generations / seconds
    } else {
        0.0
    };
    RunSummary {
        label: config.label.clone(),
        seed: config.seed,
        population_size: config.population_size,
        generations: config.generations,
        elapsed_seconds: seconds,
        generations_per_second,
        active_taxa: sys.num_active(),
        ancestor_taxa: sys.num_ancestors(),
        taxa_created: sys.next_id().0.saturating_sub(1),
        mrca_depth: sys.mrca_depth(),
        diversity: sys.calc_diversity(),
        ave_depth: sys.ave_depth(),
    }
}
