//! Per-tree growth histories.
//! For every tree of every stand: year, diameter, status and the evaluated
//! biomass / volume / Jenkins biomass. Output: one JSON file per stand.

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use stand_core::diagnostics::Diagnostics;
use stand_core::tree::TreeHistory;
use stand_core::{AnalysisConfig, InputBundle, StandAnalyzer};
use std::{fs, path::Path};
use tracing_subscriber::EnvFilter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tree_history", about = "Per-tree biomass histories from an input bundle")]
struct Args {
    /// Input bundle JSON.
    #[arg(short, long)]
    input: String,

    /// Output directory for per-stand history JSON files.
    #[arg(short, long, default_value = "out/trees")]
    output: String,

    /// Optional analysis config JSON.
    #[arg(short, long)]
    config: Option<String>,

    /// Process only this stand.
    #[arg(short, long)]
    stand: Option<String>,

    /// Process only this species (e.g. psme).
    #[arg(long)]
    species: Option<String>,
}

#[derive(Serialize)]
struct StandHistories {
    stand: String,
    trees: Vec<TreeHistory>,
    diagnostics: Diagnostics,
}

fn load_config(path: Option<&str>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = load_config(args.config.as_deref())?;

    let text = fs::read_to_string(&args.input).with_context(|| format!("reading input {}", args.input))?;
    let mut bundle = InputBundle::from_json(&text).with_context(|| format!("parsing input {}", args.input))?;
    if let Some(ref only) = args.stand {
        bundle.stands.retain(|s| &s.stand_id == only);
    }

    let analyzer = StandAnalyzer::from_bundle(&bundle, cfg).context("building equation table")?;

    eprintln!("Processing {} stands ...", bundle.stands.len());

    let results: Vec<StandHistories> = bundle
        .stands
        .par_iter()
        .map(|input| {
            let (mut trees, diagnostics) = analyzer.histories(input);
            if let Some(ref sp) = args.species {
                trees.retain(|t| t.species.eq_ignore_ascii_case(sp));
            }
            StandHistories { stand: input.stand_id.clone(), trees, diagnostics }
        })
        .collect();

    let out_dir = Path::new(&args.output);
    fs::create_dir_all(out_dir)?;

    eprintln!("\n{:<10} {:>7} {:>8} {:>12}", "Stand", "Trees", "Carried", "Diagnostics");
    eprintln!("{}", "-".repeat(40));

    for h in &results {
        let out_path = out_dir.join(format!("{}.json", h.stand));
        fs::write(&out_path, serde_json::to_string_pretty(h)?)
            .with_context(|| format!("writing {}", out_path.display()))?;

        let carried = h.trees.iter().filter(|t| t.last().is_some_and(|r| r.carried)).count();
        eprintln!("{:<10} {:>7} {:>8} {:>12}", h.stand, h.trees.len(), carried, h.diagnostics.len());
    }

    Ok(())
}
