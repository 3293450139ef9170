//! Population consistency check.
//! Reconciles every stand and lists trees that vanish between decent
//! censuses without a recorded death, or reappear alive after one.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use stand_core::consistency::{check_population, PopulationIssue};
use stand_core::reconcile::reconcile;
use stand_core::{AnalysisConfig, InputBundle};
use std::fs;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "population_check", about = "Flag vanished and resurrected trees between censuses")]
struct Args {
    /// Input bundle JSON.
    #[arg(short, long)]
    input: String,

    /// Write the issue list here as JSON instead of stdout.
    #[arg(short, long)]
    output: Option<String>,

    /// Optional analysis config JSON.
    #[arg(short, long)]
    config: Option<String>,

    /// Exit non-zero when any issue is found.
    #[arg(long)]
    strict: bool,
}

#[derive(Serialize)]
struct StandIssues {
    stand: String,
    issues: Vec<PopulationIssue>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg: AnalysisConfig = match args.config {
        Some(ref path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))?
        }
        None => AnalysisConfig::default(),
    };

    let text = fs::read_to_string(&args.input).with_context(|| format!("reading input {}", args.input))?;
    let bundle = InputBundle::from_json(&text).with_context(|| format!("parsing input {}", args.input))?;

    let report: Vec<StandIssues> = bundle
        .stands
        .iter()
        .map(|input| {
            let rec = reconcile(
                &input.stand_id,
                &input.live_observations(),
                &input.dead_observations(),
                &input.decent_years,
                &bundle.corrections.for_stand(&input.stand_id),
                &cfg,
            );
            StandIssues { stand: input.stand_id.clone(), issues: check_population(&rec.index, &rec.decent_years) }
        })
        .collect();

    let total: usize = report.iter().map(|s| s.issues.len()).sum();
    for s in report.iter().filter(|s| !s.issues.is_empty()) {
        eprintln!("{:<10} {:>5} issues", s.stand, s.issues.len());
    }

    let json = serde_json::to_string_pretty(&report)?;
    match args.output {
        Some(ref path) => fs::write(path, json).with_context(|| format!("writing {path}"))?,
        None => println!("{json}"),
    }

    if args.strict && total > 0 {
        bail!("{total} population issues across {} stands", report.len());
    }
    Ok(())
}
