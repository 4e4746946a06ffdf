//! PTZ tracking engine scenario runner CLI.
//!
//! Runs one or all deterministic scenarios and prints a pass/fail report.

use clap::Parser;
use ptz_sim::{run, ScenarioId, ScenarioResult};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Deterministic scenario runner for the PTZ tracking engine.
#[derive(Parser, Debug)]
#[command(name = "ptz-sim")]
#[command(about = "Run deterministic scenarios for the PTZ tracking engine", long_about = None)]
struct Args {
    /// Scenario to run (zoom-convergence, alternation-timing, object-lost,
    /// prediction-lead, over-capacity-drop, emergency-stop, all)
    #[arg(short, long, default_value = "all")]
    scenario: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all().to_vec()
    } else {
        match args.scenario.parse() {
            Ok(s) => vec![s],
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    };

    if !args.json {
        info!("PTZ tracking engine scenario runner");
    }

    let mut results: Vec<ScenarioResult> = Vec::new();
    for scenario in scenarios {
        let result = run(scenario).await;
        if !args.json {
            if result.passed {
                info!("PASS {} ({} ticks, {} commands)", scenario, result.ticks_run, result.commands_dispatched);
            } else {
                error!(
                    "FAIL {}: {}",
                    scenario,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        results.push(result);
    }

    let failed = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "passed": r.passed,
                    "ticks_run": r.ticks_run,
                    "commands_dispatched": r.commands_dispatched,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary).unwrap());
    } else if failed == 0 {
        info!("all {} scenario runs passed", results.len());
    } else {
        error!("{}/{} scenario runs failed", failed, results.len());
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
