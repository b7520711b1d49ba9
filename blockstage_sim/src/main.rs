//! BlockStage simulator CLI
//!
//! Runs built-in scenarios or stage files on the deterministic clock.

use anyhow::{bail, Context, Result};
use blockstage_core::EngineConfig;
use blockstage_sim::scenarios::ScenarioId;
use blockstage_sim::{ScenarioResult, ScenarioRunner, StageFile};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// BlockStage deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "blockstage-sim")]
#[command(about = "Run block programs on a deterministic virtual stage", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of agents for generated scenarios
    #[arg(short, long, default_value = "4")]
    agents: usize,

    /// Scenario to run (robot_manual, closed_square, forever_loop,
    /// canvas_glide, fault_isolation, random_walk, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Run a stage file instead of the built-in scenarios
    #[arg(long, conflicts_with = "scenario")]
    stage: Option<PathBuf>,

    /// Engine config (JSON) replacing the stage file's own
    #[arg(long, requires = "stage")]
    config: Option<PathBuf>,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export recorded frames to a JSON file (single run only)
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    if !args.json {
        info!("BlockStage simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let config = args
        .config
        .as_ref()
        .map(|path| {
            EngineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))
        })
        .transpose()?;

    let stage = args
        .stage
        .as_ref()
        .map(|path| StageFile::load(path).map(|stage| (path, stage)))
        .transpose()?;

    let scenarios: Vec<ScenarioId> = if stage.is_some() {
        Vec::new()
    } else if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args
            .scenario
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{} (try --scenario all)", e))?]
    };

    let per_seed = if stage.is_some() { 1 } else { scenarios.len() };
    let runs = per_seed * args.seeds;
    if args.export.is_some() && runs > 1 {
        bail!("--export only supports a single run");
    }

    let mut results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let mut runner = ScenarioRunner::new(seed).with_agents(args.agents);
        if let Some(config) = &config {
            runner = runner.with_config(config.clone());
        }

        if let Some((path, stage)) = &stage {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "stage".to_string());
            results.push(runner.run_stage(&name, stage)?);
        }
        for scenario in &scenarios {
            if !args.json {
                info!("  {}", scenario.description());
            }
            results.push(runner.run(*scenario)?);
        }
    }

    if let (Some(path), Some(result)) = (&args.export, results.first()) {
        result
            .export
            .write_to_file(path)
            .with_context(|| format!("failed to write export {}", path.display()))?;
        info!("Exported {} frames to {}", result.export.frames.len(), path.display());
    }

    let total = results.len();
    let failed: Vec<&ScenarioResult> = results.iter().filter(|r| !r.passed).collect();

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} run(s) passed!", total);
        } else {
            error!("❌ {}/{} run(s) failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if !failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
