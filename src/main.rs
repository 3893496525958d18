use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use comms_planner::classify::{ClassificationCache, KeywordClassifier};
use comms_planner::config::PlannerConfig;
use comms_planner::model::{Customer, Letter};
use comms_planner::planning::types::BatchResult;
use comms_planner::planning::{BatchPlanner, BatchSummary, CostModel, StopSignal};

#[derive(Debug, Deserialize)]
struct BatchInput {
    letter: Letter,
    customers: Vec<Customer>,
}

#[derive(Serialize)]
struct BatchOutput<'a> {
    result: &'a BatchResult,
    summary: &'a BatchSummary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON report.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Some(input_path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: comms-planner <input.json>");
        eprintln!("  COMMS_PLANNER_CONFIG=planner.json   optional config file");
        eprintln!("  COMMS_PLANNER_SCENARIO=realistic    cost scenario");
        std::process::exit(2);
    };

    let config = PlannerConfig::from_env().context("loading planner configuration")?;

    let raw = std::fs::read_to_string(&input_path)
        .with_context(|| format!("reading {}", input_path.display()))?;
    let input: BatchInput = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", input_path.display()))?;

    let cost_model = CostModel::from_scenarios(config.scenarios.clone());
    let scenario = cost_model.scenario(&config.scenario)?.clone();

    eprintln!("Comms planner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Scenario: {} ({})", scenario.name(), scenario.description());
    eprintln!("   Customers: {}", input.customers.len());
    eprintln!("   Concurrency: {}", config.batch.concurrency);

    let classifier = Arc::new(KeywordClassifier::default_rules()?);
    let cache = Arc::new(ClassificationCache::new());
    let planner = BatchPlanner::from_config(&config, classifier, cache)?;

    let stop = StopSignal::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight customers");
                stop.stop();
            }
        });
    }

    let result = planner
        .run_with_stop(&input.customers, &input.letter, &scenario, &stop)
        .await?;
    let summary = BatchSummary::from_result(&result);

    println!(
        "{}",
        serde_json::to_string_pretty(&BatchOutput {
            result: &result,
            summary: &summary,
        })?
    );
    Ok(())
}
