//! galchem - Entry point
//!
//! CLI Usage:
//!   galchem                              # Reference one-zone model, defaults
//!   galchem -p model.json                # Parameters from a JSON file
//!   galchem -p model.json -o out/run1    # Choose the output directory
//!   galchem --write-defaults params.json # Dump the default parameters

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use galchem::{
    config::Parameters,
    export::{write_multizone, write_singlezone, OutputDir},
    multizone::MultizoneCoordinator,
    singlezone::SingleZone,
    zone::ZoneDiagnostics,
};

struct CliArgs {
    params: Option<PathBuf>,
    output: Option<PathBuf>,
    overwrite: bool,
    quiet: bool,
    write_defaults: Option<PathBuf>,
}

/// Parse CLI arguments
fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        params: None,
        output: None,
        overwrite: false,
        quiet: false,
        write_defaults: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-p" | "--params" => {
                i += 1;
                if i < args.len() {
                    cli.params = Some(PathBuf::from(&args[i]));
                }
            }
            "-o" | "--output" => {
                i += 1;
                if i < args.len() {
                    cli.output = Some(PathBuf::from(&args[i]));
                }
            }
            "--write-defaults" => {
                i += 1;
                if i < args.len() {
                    cli.write_defaults = Some(PathBuf::from(&args[i]));
                }
            }
            "--overwrite" | "-f" => cli.overwrite = true,
            "--quiet" | "-q" => cli.quiet = true,
            "--help" | "-h" => {
                println!("galchem");
                println!();
                println!("Usage: galchem [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --params FILE        JSON parameter file (default: built-in model)");
                println!("  -o, --output DIR         Output directory (default: run name)");
                println!("  -f, --overwrite          Replace an existing output directory");
                println!("  -q, --quiet              Skip the per-output diagnostics table");
                println!("  --write-defaults FILE    Write the default parameters and exit");
                println!("  --help, -h               Show this help");
                std::process::exit(0);
            }
            other => log::warn!("ignoring unknown argument '{}'", other),
        }
        i += 1;
    }

    cli
}

fn run_singlezone(params: &Parameters, out: OutputDir, quiet: bool) -> Result<()> {
    let grid = params.time_grid()?;
    let config = params.zone_config(&params.run.name)?;
    let registry = params.table_registry()?;
    let mut model = SingleZone::new(config, grid);
    model.initialize(Some(&registry))?;

    if !quiet {
        ZoneDiagnostics::print_row_header();
    }
    let start = Instant::now();
    let every = (model.stepper().grid().n_steps() / 10).max(1);
    while !model.stepper().is_complete() {
        model.step()?;
        if !quiet && model.stepper().state().tick % every == 0 {
            model.stepper().diagnostics().print_row();
        }
    }
    let summary = model.finalize();
    log::info!("integration took {:.2?}", start.elapsed());

    println!();
    summary.print_summary();
    let written = write_singlezone(out, &model, &summary, Some(params.to_json_value()?))?;
    println!("\nOutput: {}", written.display());
    Ok(())
}

fn run_multizone(params: &Parameters, out: OutputDir, quiet: bool) -> Result<()> {
    let config = params
        .multizone_config()?
        .context("multizone parameters missing")?;
    let registry = params.table_registry()?;
    let mut model = MultizoneCoordinator::new(config)?;
    model.initialize(Some(&registry))?;

    let start = Instant::now();
    let n_steps = model.grid().n_steps();
    while !model.is_complete() {
        model.step()?;
        let tick = model.tick();
        if !quiet && n_steps >= 10 && tick % (n_steps / 10) == 0 {
            println!(
                "  {:3.0}%: t={:.3} Gyr, tracers={}, Mgas={:.4e}, Mstar={:.4e}",
                100.0 * tick as f64 / n_steps as f64,
                model.grid().time(tick),
                model.tracers().len(),
                model.total_gas_msun(),
                model.total_stars_msun()
            );
        }
    }
    let summary = model.finalize();
    log::info!("integration took {:.2?}", start.elapsed());

    if !quiet {
        println!();
        ZoneDiagnostics::print_row_header();
        for zone in model.zones() {
            zone.diagnostics().print_row();
        }
    }
    println!();
    summary.print_summary();
    let written = write_multizone(out, &model, &summary, Some(params.to_json_value()?))?;
    println!("\nOutput: {}", written.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = parse_args();

    if let Some(path) = cli.write_defaults {
        let json = serde_json::to_string_pretty(&Parameters::default())?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Default parameters written to {}", path.display());
        return Ok(());
    }

    let params = match &cli.params {
        Some(path) => Parameters::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Parameters::default(),
    };
    let output = cli.output.unwrap_or_else(|| PathBuf::from(&params.run.name));
    let overwrite = cli.overwrite || params.run.overwrite;

    log::info!("galchem {} starting run '{}'", env!("CARGO_PKG_VERSION"), params.run.name);

    // an existing or unwritable target fails before any integration
    let out = OutputDir::create(&output, overwrite)
        .with_context(|| format!("preparing output {}", output.display()))?;

    if params.multizone.is_some() {
        run_multizone(&params, out, cli.quiet)
    } else {
        run_singlezone(&params, out, cli.quiet)
    }
}
