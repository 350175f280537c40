//! PodiumForge: athlete archetypes from Olympic results
//!
//! This is the main entrypoint that orchestrates dataset retrieval, the
//! analysis pipeline, reporting, visualization, and prediction.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use podiumforge::{
    ensure_dataset, load_athletes, run_analysis, viz, AnalysisRun, Args, AthleteRecord,
    AthleteTable, Narrative, RunReport,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.verbose {
        println!("PodiumForge - Athlete archetypes using PCA + K-Means");
        println!("====================================================\n");
    }

    let start_time = Instant::now();
    let newcomer = args.parse_predict_athlete()?;
    let (table, run) = analyse(&args)?;

    if let Some(athlete) = newcomer {
        run_prediction_mode(&run, &athlete)?;
    } else {
        run_full_report(&args, &table, &run)?;
    }

    if args.verbose {
        println!("\nTotal processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Retrieve, load and analyse the configured sport
fn analyse(args: &Args) -> Result<(AthleteTable, AnalysisRun)> {
    ensure_dataset(&args.input, &args.url, args.refresh)
        .with_context(|| format!("preparing dataset at {}", args.input.display()))?;

    let table = load_athletes(&args.input, &args.sport)?;
    println!(
        "✓ Data loaded: {} {} entries ({} dropped)",
        table.records.len(),
        table.sport,
        table.drops.total()
    );

    let config = args.analysis_config();
    let run = run_analysis(&table.records, &config)?;
    println!(
        "✓ Model fitted: {} archetypes after {} iteration(s)",
        run.archetypes.len(),
        run.model.iterations
    );

    Ok((table, run))
}

/// Assign one athlete described on the command line
fn run_prediction_mode(run: &AnalysisRun, athlete: &AthleteRecord) -> Result<()> {
    println!("\n=== Prediction Mode ===");
    println!(
        "Input: age={}, height={}cm, weight={}kg",
        athlete.age, athlete.height, athlete.weight
    );

    let archetype = run.predict(athlete)?;
    println!("\n✓ Predicted archetype: {}", archetype.name);

    let profile = &archetype.profile;
    let total = run.assignments.len();
    println!(
        "  Size: {} athletes ({:.1}% of total)",
        profile.count,
        profile.count as f64 / total as f64 * 100.0
    );
    if let Some(weight) = profile.weight {
        println!("  Weight: {:.1} ± {:.1} kg", weight.mean, weight.std_dev);
    }
    if let Ok(rate) = run
        .summary
        .summary(&archetype.name)
        .context("archetype missing from summary")?
        .medal_rate()
    {
        println!("  Medal rate: {:.1}%", rate * 100.0);
    }

    Ok(())
}

/// Narrative, charts and the optional JSON report
fn run_full_report(args: &Args, table: &AthleteTable, run: &AnalysisRun) -> Result<()> {
    let report = RunReport::new(table, run);
    println!("\n{}", Narrative { report: &report });

    let (scatter, rates) = viz::generate_visualization_report(run, &table.records, &args.output)?;
    println!("\n✓ Visualizations generated");
    println!("Projection plot saved to: {}", scatter.display());
    println!("Medal rate charts saved to: {}", rates.display());

    if let Some(ref json_path) = args.json {
        report.write_json(json_path)?;
        println!("Run report saved to: {}", json_path.display());
    }

    Ok(())
}
