//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Clocked partition scheduler: runs a simulated entity's partitions on
/// their own threads, driven by input clocks and output-clock dependencies.
#[derive(Debug, Parser)]
#[command(name = "partition-sched")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("source").args(["scenario", "preset"])))]
pub struct CliOptions {
    /// Load the scenario from a TOML file.
    #[arg(long, value_name = "PATH")]
    pub scenario: Option<PathBuf>,

    /// Use a built-in preset (clocks, every_tick).
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Directory for the per-partition CSV files.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Skip the wall-clock sleep between ticks.
    #[arg(long)]
    pub no_pacing: bool,

    /// Write the run report as JSON.
    #[arg(long, value_name = "PATH")]
    pub report_json: Option<PathBuf>,

    /// Override the model's random seed.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl CliOptions {
    /// Preset to load when no scenario file is given.
    pub fn preset_name(&self) -> &str {
        self.preset.as_deref().unwrap_or("clocks")
    }
}
