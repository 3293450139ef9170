//! Pipeline orchestrator: runs every stage for one stand in order.

use serde::Serialize;

use crate::aggregate::{aggregate_plots, aggregate_stand, MalformedTree, PlotAggregation, StandAggregation};
use crate::config::AnalysisConfig;
use crate::consistency::{check_population, PopulationIssue};
use crate::diagnostics::Diagnostics;
use crate::equations::EquationTable;
use crate::error::Result;
use crate::input::{InputBundle, StandInput};
use crate::observation::Year;
use crate::reconcile::reconcile;
use crate::reference::ReferenceSession;
use crate::tree::{tree_histories, TreeHistory};

// ── Output ────────────────────────────────────────────────────────────────────

/// Everything computed for one stand.
#[derive(Debug, Clone, Serialize)]
pub struct StandAnalysis {
    pub stand: String,
    pub decent_years: Vec<Year>,
    /// Missing trees given a diameter from an earlier census.
    pub bridged: usize,
    pub stand_totals: StandAggregation,
    pub plot_totals: PlotAggregation,
    pub issues: Vec<PopulationIssue>,
    /// Reconciliation and aggregation diagnostics, in that order.
    pub diagnostics: Diagnostics,
}

impl StandAnalysis {
    pub fn malformed(&self) -> &[MalformedTree] {
        &self.stand_totals.malformed
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Immutable per-run state shared by every stand.
pub struct StandAnalyzer {
    pub equations: EquationTable,
    pub references: ReferenceSession,
    pub config: AnalysisConfig,
}

impl StandAnalyzer {
    pub fn new(equations: EquationTable, references: ReferenceSession, config: AnalysisConfig) -> Self {
        Self { equations, references, config }
    }

    /// Build the equation table and reference session from an input bundle.
    /// Fails on a malformed equation row.
    pub fn from_bundle(bundle: &InputBundle, config: AnalysisConfig) -> Result<Self> {
        let equations = EquationTable::from_rows(&bundle.equations)?;
        let references = ReferenceSession::build(&bundle.reference, bundle.corrections.clone(), &config);
        tracing::info!(equations = equations.len(), stands = bundle.stands.len(), "session ready");
        Ok(Self::new(equations, references, config))
    }

    /// Run the full pipeline for one stand.
    ///
    /// Pipeline order:
    ///   1. Temporal reconciliation
    ///   2. Stand-scale aggregation (with "ALL" roll-up)
    ///   3. Plot-scale aggregation
    ///   4. Population consistency check
    pub fn analyze(&self, input: &StandInput) -> Result<StandAnalysis> {
        let stand = input.stand_id.as_str();
        let live = input.live_observations();
        let dead = input.dead_observations();

        // ── 1. Reconciliation ───────────────────────────────────────────────
        let corrections = self.references.corrections(stand);
        let rec = reconcile(stand, &live, &dead, &input.decent_years, &corrections, &self.config);

        // ── 2. Stand totals ─────────────────────────────────────────────────
        let refs = self.references.stand(stand);
        let stand_totals = aggregate_stand(stand, &rec.index, refs, &self.equations, &self.config)?;

        // ── 3. Plot totals ──────────────────────────────────────────────────
        let plot_totals = aggregate_plots(stand, &rec.index, refs, &self.equations, &self.config)?;

        // ── 4. Consistency ──────────────────────────────────────────────────
        let issues = check_population(&rec.index, &rec.decent_years);

        // Plot-scale coercions repeat the stand-scale ones.
        let mut diagnostics = rec.diagnostics;
        diagnostics.extend(stand_totals.diagnostics.clone());

        tracing::info!(
            stand,
            cells = rec.index.len(),
            bridged = rec.bridged,
            malformed = stand_totals.malformed.len(),
            issues = issues.len(),
            "stand analysed"
        );

        Ok(StandAnalysis {
            stand: stand.to_string(),
            decent_years: rec.decent_years,
            bridged: rec.bridged,
            stand_totals,
            plot_totals,
            issues,
            diagnostics,
        })
    }

    /// Every stand of a batch. Results keep input order; a failed stand does
    /// not stop the others.
    pub fn analyze_batch(&self, stands: &[StandInput]) -> Vec<Result<StandAnalysis>> {
        #[cfg(feature = "threading")]
        {
            use rayon::prelude::*;
            stands.par_iter().map(|s| self.analyze(s)).collect()
        }
        #[cfg(not(feature = "threading"))]
        {
            stands.iter().map(|s| self.analyze(s)).collect()
        }
    }

    /// Per-tree growth histories for one stand.
    pub fn histories(&self, input: &StandInput) -> (Vec<TreeHistory>, Diagnostics) {
        let mut diags = Diagnostics::default();
        let histories = tree_histories(
            &input.stand_id,
            &input.live_observations(),
            &input.dead_observations(),
            &self.equations,
            &self.config,
            &mut diags,
        );
        (histories, diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn bundle(species: &str) -> InputBundle {
        InputBundle::from_json(&format!(
            r#"{{
                "stands": [
                    {{"stand_id": "RS01", "decent_years": [1990], "live": [
                        {{"tree_id": "a", "species": "{species}", "plot": 1, "dbh": 20.0, "status": "ok", "year": 1990}}
                    ]}},
                    {{"stand_id": "RS02", "decent_years": [1990], "live": [
                        {{"tree_id": "b", "species": "psme", "plot": 1, "dbh": 25.0, "status": "ok", "year": 1990}}
                    ]}}
                ],
                "equations": [{{"species": "psme", "form": "lnln", "b1": -2.0, "b2": 2.4}}]
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn analyze_runs_every_stage() {
        let b = bundle("psme");
        let analyzer = StandAnalyzer::from_bundle(&b, AnalysisConfig::default()).unwrap();
        let out = analyzer.analyze(&b.stands[0]).unwrap();
        assert_eq!(out.decent_years, vec![1990]);
        assert!(out.stand_totals.all(1990).is_some());
        assert!(out.plot_totals.plot(1990, 1).is_some());
        assert!(out.issues.is_empty());
        // No reference rows: the stand area falls back to the default.
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn analysis_serializes_to_json() {
        let b = bundle("psme");
        let analyzer = StandAnalyzer::from_bundle(&b, AnalysisConfig::default()).unwrap();
        let out = analyzer.analyze(&b.stands[0]).unwrap();
        let json: serde_json::Value = serde_json::to_value(&out).unwrap();
        assert!(json["stand_totals"]["species"].is_array());
        assert!(json["plot_totals"]["plot_species"].is_array());
    }

    #[test]
    fn failing_stand_does_not_stop_the_batch() {
        let b = bundle("abam");
        let analyzer = StandAnalyzer::from_bundle(&b, AnalysisConfig::default()).unwrap();
        let results = analyzer.analyze_batch(&b.stands);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(CoreError::MissingEquation { .. })));
        assert_eq!(results[1].as_ref().unwrap().stand, "RS02");
    }

    #[test]
    fn histories_cover_every_tree() {
        let b = bundle("psme");
        let analyzer = StandAnalyzer::from_bundle(&b, AnalysisConfig::default()).unwrap();
        let (h, diags) = analyzer.histories(&b.stands[0]);
        assert_eq!(h.len(), 1);
        assert!(h[0].records[0].metrics.biomass > 0.0);
        assert!(diags.is_empty());
    }
}
