//! Command-line interface of the profiling binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_PATH;

/// Profile the lineage tracker on a synthetic evolving population.
#[derive(Parser, Debug)]
#[command(name = "phylotrack-profile")]
#[command(version)]
pub struct Cli {
    /// YAML file with optional `systematics` and `run` sections
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_working_directory_file() {
        let cli = Cli::try_parse_from(["phylotrack-profile"]).ok();
        assert_eq!(cli.map(|c| c.config), Some(PathBuf::from(DEFAULT_CONFIG_PATH)));
    }

    #[test]
    fn config_flag_overrides_path() {
        let cli = Cli::try_parse_from(["phylotrack-profile", "--config", "runs/a.yaml"]).ok();
        assert_eq!(cli.map(|c| c.config), Some(PathBuf::from("runs/a.yaml")));
        let cli = Cli::try_parse_from(["phylotrack-profile", "--config=b.yaml"]).ok();
        assert_eq!(cli.map(|c| c.config), Some(PathBuf::from("b.yaml")));
    }

    #[test]
    fn unknown_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["phylotrack-profile", "--verbose"]).is_err());
        assert!(Cli::try_parse_from(["phylotrack-profile", "--config"]).is_err());
    }
}
