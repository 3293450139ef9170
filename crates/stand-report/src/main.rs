//! Stand biomass report.
//! Reads an exported input bundle, analyses every stand in parallel and
//! writes per-hectare tables (CSV) plus a JSON run summary.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use stand_core::consistency::PopulationIssue;
use stand_core::diagnostics::Diagnostic;
use stand_core::observation::Year;
use stand_core::report::{self, ReportRow};
use stand_core::{AnalysisConfig, InputBundle, StandAnalysis, StandAnalyzer};
use std::{fs, path::Path};
use tracing_subscriber::EnvFilter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "stand-report", about = "Per-hectare biomass, volume and stem tables per stand")]
struct Args {
    /// Input bundle JSON (stands, equations, reference rows, corrections).
    #[arg(short, long)]
    input: String,

    /// Output directory for CSV and JSON files.
    #[arg(short, long, default_value = "out")]
    output: String,

    /// Optional analysis config JSON; missing keys keep their defaults.
    #[arg(short, long)]
    config: Option<String>,

    /// Process only this stand.
    #[arg(short, long)]
    stand: Option<String>,

    /// Also write the large-tree-only stand table.
    #[arg(long)]
    large_only: bool,
}

// ── Output types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StandSummary<'a> {
    stand: &'a str,
    decent_years: &'a [Year],
    bridged: usize,
    malformed: usize,
    diagnostics: &'a [Diagnostic],
    issues: &'a [PopulationIssue],
}

#[derive(Serialize)]
struct RunSummary<'a> {
    stands: Vec<StandSummary<'a>>,
    failed: Vec<(String, String)>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_config(path: Option<&str>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))
}

fn write(dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))
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
        if bundle.stands.is_empty() {
            bail!("stand {only} not found in {}", args.input);
        }
    }

    let analyzer = StandAnalyzer::from_bundle(&bundle, cfg).context("building equation table")?;
    tracing::info!(stands = bundle.stands.len(), "analysing");

    let results = analyzer.analyze_batch(&bundle.stands);

    let mut done: Vec<StandAnalysis> = Vec::with_capacity(results.len());
    let mut failed: Vec<(String, String)> = Vec::new();
    for (input, res) in bundle.stands.iter().zip(results) {
        match res {
            Ok(a) => done.push(a),
            Err(e) => {
                tracing::warn!(stand = %input.stand_id, error = %e, "stand skipped");
                failed.push((input.stand_id.clone(), e.to_string()));
            }
        }
    }
    if !failed.is_empty() {
        tracing::warn!(count = failed.len(), "stands skipped due to configuration errors");
    }

    let out_dir = Path::new(&args.output);
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let cfg = &analyzer.config;
    let stand_rows: Vec<ReportRow> = done.iter().flat_map(|a| report::stand_rows(&a.stand_totals, cfg)).collect();
    let plot_rows: Vec<ReportRow> = done.iter().flat_map(|a| report::plot_rows(&a.plot_totals, cfg)).collect();
    let malformed: Vec<_> = done.iter().flat_map(|a| a.malformed().iter().cloned()).collect();

    write(out_dir, "stand_totals.csv", &report::to_csv(&stand_rows)?)?;
    write(out_dir, "plot_totals.csv", &report::to_csv(&plot_rows)?)?;
    write(out_dir, "malformed_trees.csv", &report::malformed_csv(&malformed)?)?;

    if args.large_only {
        let rows: Vec<ReportRow> =
            done.iter().flat_map(|a| report::large_only_rows(&a.stand_totals, cfg)).collect();
        write(out_dir, "stand_totals_large.csv", &report::to_csv(&rows)?)?;
    }

    let summary = RunSummary {
        stands: done
            .iter()
            .map(|a| StandSummary {
                stand: &a.stand,
                decent_years: &a.decent_years,
                bridged: a.bridged,
                malformed: a.malformed().len(),
                diagnostics: &a.diagnostics.entries,
                issues: &a.issues,
            })
            .collect(),
        failed,
    };
    write(out_dir, "summary.json", &serde_json::to_string_pretty(&summary)?)?;

    eprintln!(
        "\n{:<10} {:>6} {:>8} {:>10} {:>7} {:>12}",
        "Stand", "Years", "Bridged", "Malformed", "Issues", "Diagnostics"
    );
    eprintln!("{}", "-".repeat(58));
    for a in &done {
        eprintln!(
            "{:<10} {:>6} {:>8} {:>10} {:>7} {:>12}",
            a.stand,
            a.decent_years.len(),
            a.bridged,
            a.malformed().len(),
            a.issues.len(),
            a.diagnostics.len()
        );
    }
    eprintln!("\nWrote {} stand rows, {} plot rows to {}", stand_rows.len(), plot_rows.len(), out_dir.display());

    Ok(())
}
