//! Command-line parsing for the pipeline binary.
//!
//! Argument parsing and command dispatch stay separate from the statistics:
//! this module only defines the surface, `app` maps it onto stages.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "qes",
    version,
    about = "Monetary expansion & asset valuations research pipeline"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// One subcommand per pipeline stage, plus `run` for the whole sequence.
///
/// Every stage reads only the persisted outputs of earlier stages, so any of
/// them can be re-invoked standalone against existing files.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download all raw series (FRED, Yahoo, Shiller) into data/raw.
    Fetch(StageArgs),
    /// Aggregate raw series into the monthly panel (CSV + Parquet).
    Panel(StageArgs),
    /// Unit-root and cointegration diagnostics on the panel.
    Diag(StageArgs),
    /// Vector error-correction model (rank test, fit, IRFs).
    Vecm(StageArgs),
    /// Two-state regime model (EM fit + Viterbi decode).
    Regimes(StageArgs),
    /// Boosted-tree return model with additive attribution.
    Boost(StageArgs),
    /// Local-projection impulse responses.
    Irf(StageArgs),
    /// Event study around QE announcement dates.
    Events(StageArgs),
    /// Run every stage in sequence.
    Run(StageArgs),
}

/// Options shared by all stages.
#[derive(Debug, Parser, Clone)]
pub struct StageArgs {
    /// Root of the data directory tree (raw/external/processed).
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Root of the results directory tree (tables/figures/models).
    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,
}
