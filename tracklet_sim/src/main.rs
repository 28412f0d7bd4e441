//! Displaced tracklet processor simulator CLI
//!
//! Runs seeded event scenarios through every seed and sector pipeline.

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tracklet_core::{Seed, Settings};
use tracklet_sim::scenarios::ScenarioId;
use tracklet_sim::{ScenarioResult, ScenarioRunner, SimExport};

/// Displaced tracklet processor simulation CLI
#[derive(Parser, Debug)]
#[command(name = "tracklet-sim")]
#[command(about = "Run seeded workloads through the displaced tracklet processor", long_about = None)]
struct Args {
    /// Master seed for determinism
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (single_particle, displaced_jets, buffer_pressure, pipeline_starvation, determinism, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Events per scenario
    #[arg(short, long, default_value = "10")]
    events: usize,

    /// Restrict to one tracklet seed (L3L4L2, L5L6L4, L2L3D1, D1D2L2)
    #[arg(long)]
    tracklet_seed: Option<String>,

    /// Settings JSON file; missing fields take their defaults
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export tracklets of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    }
}

/// Runs the requested scenarios. Returns whether all of them passed.
fn run(args: &Args) -> anyhow::Result<bool> {
    if !args.json {
        info!("Displaced tracklet simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let settings = match &args.config {
        Some(path) => Settings::from_json_file(path).with_context(|| format!("loading {}", path))?,
        None => Settings::default(),
    };

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().map_err(anyhow::Error::msg)?]
    };

    let seeds = match &args.tracklet_seed {
        Some(name) => vec![name.parse::<Seed>().map_err(anyhow::Error::msg)?],
        None => Seed::ALL.to_vec(),
    };

    if let Some(path) = &args.export {
        if scenarios.len() > 1 || args.seeds > 1 {
            bail!("--export only supports a single scenario and seed");
        }
        let result = ScenarioRunner::new(args.seed)
            .with_events(args.events)
            .with_settings(settings.clone())
            .with_seeds(seeds)
            .run(scenarios[0])?;
        let export = SimExport::from_result(&settings, &result);
        export
            .write_to_file(path)
            .with_context(|| format!("writing {}", path))?;
        info!("Exported {} events to {}", export.events.len(), path);
        report(&result);
        return Ok(result.passed);
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = args.seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_events(args.events)
            .with_settings(settings.clone())
            .with_seeds(seeds.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario)?;
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed == 0)
}

fn report(result: &ScenarioResult) {
    let m = &result.metrics;
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED | tracklets={} projections={} unconsumed_pairs={} cycles={}",
            result.scenario.name(),
            result.seed,
            m.stats.tracklets,
            m.stats.projections,
            m.stats.unconsumed_pairs,
            m.stats.cycles
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}
