//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that
//! parses the CLI, builds the run configuration, dispatches stages and
//! prints their reports. Estimation-level warnings arrive as stage notes
//! and go to stderr; only retrieval/configuration failures abort.

use clap::Parser;

use crate::cli::{Cli, Command, StageArgs};
use crate::config::RunConfig;
use crate::error::AppError;
use crate::report;

pub mod pipeline;

/// Entry point for the `qes` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Fetch(args) => handle_fetch(&config_from(&args)?),
        Command::Panel(args) => handle_panel(&config_from(&args)?),
        Command::Diag(args) => handle_diag(&config_from(&args)?),
        Command::Vecm(args) => handle_vecm(&config_from(&args)?),
        Command::Regimes(args) => handle_regimes(&config_from(&args)?),
        Command::Boost(args) => handle_boost(&config_from(&args)?),
        Command::Irf(args) => handle_localproj(&config_from(&args)?),
        Command::Events(args) => handle_events(&config_from(&args)?),
        Command::Run(args) => handle_run(&config_from(&args)?),
    }
}

fn config_from(args: &StageArgs) -> Result<RunConfig, AppError> {
    let config = RunConfig::new(&args.data_dir, &args.results_dir);
    config.validate()?;
    Ok(config)
}

fn print_notes(notes: &[String]) {
    for note in notes {
        eprintln!("warning: {note}");
    }
}

fn handle_fetch(config: &RunConfig) -> Result<(), AppError> {
    let (series, shiller_months) = pipeline::run_fetch(config)?;
    println!("{}", report::format_fetch_summary(&series, shiller_months));
    Ok(())
}

fn handle_panel(config: &RunConfig) -> Result<(), AppError> {
    let panel = pipeline::run_panel(config)?;
    println!("{}", report::format_panel_summary(&panel));
    Ok(())
}

fn handle_diag(config: &RunConfig) -> Result<(), AppError> {
    let panel = pipeline::load_panel(config)?;
    let (adf, johansen, notes) = pipeline::run_diagnostics(config, &panel)?;
    print_notes(&notes);
    println!("{}", report::format_unit_root_table(&adf));
    if let Some(result) = johansen {
        println!("{}", report::format_johansen(&result));
    }
    Ok(())
}

fn handle_vecm(config: &RunConfig) -> Result<(), AppError> {
    let panel = pipeline::load_panel(config)?;
    let outcome = pipeline::run_vecm(config, &panel)?;
    print_notes(&outcome.notes);
    println!("{}", report::format_johansen(&outcome.rank_test));
    if let Some(artifact) = &outcome.artifact {
        println!("{}", report::format_vecm(artifact, &outcome.notes));
    }
    Ok(())
}

fn handle_regimes(config: &RunConfig) -> Result<(), AppError> {
    let panel = pipeline::load_panel(config)?;
    let outcome = pipeline::run_regimes(config, &panel)?;
    print_notes(&outcome.notes);
    if let Some(artifact) = &outcome.artifact {
        println!("{}", report::format_regimes(artifact));
    }
    Ok(())
}

fn handle_boost(config: &RunConfig) -> Result<(), AppError> {
    let panel = pipeline::load_panel(config)?;
    let outcome = pipeline::run_boost(config, &panel)?;
    print_notes(&outcome.notes);
    if let Some(artifact) = &outcome.artifact {
        println!("{}", report::format_boost(artifact));
    }
    Ok(())
}

fn handle_localproj(config: &RunConfig) -> Result<(), AppError> {
    let panel = pipeline::load_panel(config)?;
    let outcome = pipeline::run_localproj(config, &panel)?;
    print_notes(&outcome.notes);
    if let Some(artifact) = &outcome.artifact {
        println!("{}", report::format_localproj(artifact));
    }
    Ok(())
}

fn handle_events(config: &RunConfig) -> Result<(), AppError> {
    let outcome = pipeline::run_events(config)?;
    print_notes(&outcome.notes);
    if let Some(artifact) = &outcome.artifact {
        println!("{}", report::format_event_study(artifact));
    }
    Ok(())
}

/// The full sequence. Fetch and panel failures abort; estimator stages
/// surface their own skip notes but never block one another.
fn handle_run(config: &RunConfig) -> Result<(), AppError> {
    println!("{}", report::format_run_header(config));
    handle_fetch(config)?;
    handle_panel(config)?;
    handle_diag(config)?;
    handle_vecm(config)?;
    handle_regimes(config)?;
    handle_boost(config)?;
    handle_localproj(config)?;
    handle_events(config)?;
    Ok(())
}
