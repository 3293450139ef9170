//! Per-tree growth histories.
//!
//! Unlike the stand pass, this covers every species (excluded ones are
//! evaluated with whatever equation the table holds for them, typically a
//! composite) and never fails: a tree without an equation gets zero metrics
//! and a diagnostic.
//!
//! A tree whose final record has a null diameter and status Dead or Missing
//! carries forward the metrics of its previous record.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::equations::{EquationTable, TreeMetrics};
use crate::observation::{PlotId, TreeObservation, TreeStatus, Year};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeYear {
    pub year: Year,
    pub dbh: Option<f64>,
    pub status: TreeStatus,
    pub metrics: TreeMetrics,
    /// Metrics copied from the previous record.
    pub carried: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeHistory {
    pub tree_id: String,
    pub species: String,
    pub plot: PlotId,
    /// Ascending by year, one record per year.
    pub records: Vec<TreeYear>,
}

impl TreeHistory {
    pub fn last(&self) -> Option<&TreeYear> {
        self.records.last()
    }
}

/// Build one history per tree id from live-table and dead-table observations.
pub fn tree_histories(
    stand: &str,
    live: &[TreeObservation],
    dead: &[TreeObservation],
    equations: &EquationTable,
    cfg: &AnalysisConfig,
    diags: &mut Diagnostics,
) -> Vec<TreeHistory> {
    let mut by_tree: BTreeMap<&str, BTreeMap<Year, &TreeObservation>> = BTreeMap::new();

    // Live-table rows first; a dead-table row only fills a year that is
    // absent or has no diameter.
    for obs in live.iter().chain(dead.iter()) {
        let years = by_tree.entry(obs.tree_id.as_str()).or_default();
        match years.get(&obs.year) {
            Some(existing) if existing.dbh.is_some() || obs.dbh.is_none() => {}
            _ => {
                years.insert(obs.year, obs);
            }
        }
    }

    let mut unequipped: BTreeSet<String> = BTreeSet::new();
    let mut histories = Vec::with_capacity(by_tree.len());

    for (tree_id, years) in by_tree {
        let Some(first) = years.values().next() else { continue };
        let mut records: Vec<TreeYear> = Vec::with_capacity(years.len());

        for obs in years.values() {
            let metrics = match obs.dbh {
                Some(dbh) => {
                    let equation = if dbh >= cfg.large_dbh {
                        equations.for_large(&obs.species, dbh)
                    } else {
                        equations.for_small(&obs.species)
                    };
                    match equation {
                        Ok(eq) => eq.evaluate(dbh),
                        Err(_) => {
                            if unequipped.insert(tree_id.to_string()) {
                                diags.push(
                                    stand,
                                    Diagnostic::NoEquation {
                                        species: obs.species.clone(),
                                        tree_id: tree_id.to_string(),
                                    },
                                );
                            }
                            TreeMetrics::default()
                        }
                    }
                }
                None => TreeMetrics::default(),
            };
            records.push(TreeYear { year: obs.year, dbh: obs.dbh, status: obs.status, metrics, carried: false });
        }

        carry_forward_final(&mut records);

        histories.push(TreeHistory {
            tree_id: tree_id.to_string(),
            species: first.species.clone(),
            plot: first.plot,
            records,
        });
    }

    histories
}

fn carry_forward_final(records: &mut [TreeYear]) {
    let n = records.len();
    if n < 2 {
        return;
    }
    let last = &records[n - 1];
    if last.dbh.is_none() && !last.status.is_alive() {
        let previous = records[n - 2].metrics;
        let last = &mut records[n - 1];
        last.metrics = previous;
        last.carried = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::{Coefficients, Equation, EquationForm, EquationRow, JenkinsCoefficients, SizeTier};

    fn obs(tree: &str, species: &str, year: Year, dbh: Option<f64>, status: TreeStatus) -> TreeObservation {
        TreeObservation {
            tree_id: tree.into(),
            species: species.into(),
            plot: 1,
            year,
            dbh,
            status,
            dbh_code: None,
        }
    }

    fn table() -> EquationTable {
        let mut t = EquationTable::default();
        t.insert(
            "psme",
            SizeTier::Normal,
            Equation {
                form: EquationForm::Lnln { b: Coefficients { b1: -2.0, b2: 2.4, b3: 0.0 } },
                wood_density: 0.45,
                jenkins: JenkinsCoefficients { j1: -2.5, j2: 2.4 },
            },
        );
        t
    }

    #[test]
    fn final_dead_with_null_diameter_carries_previous_biomass() {
        let live = [
            obs("t", "psme", 1985, Some(30.0), TreeStatus::Ok),
            obs("t", "psme", 1990, Some(32.0), TreeStatus::Ok),
            obs("t", "psme", 1995, None, TreeStatus::Dead),
        ];
        let mut diags = Diagnostics::default();
        let h = tree_histories("RS01", &live, &[], &table(), &AnalysisConfig::default(), &mut diags);
        assert_eq!(h.len(), 1);
        let records = &h[0].records;
        assert_eq!(records.len(), 3);
        assert!(records[2].carried);
        assert_eq!(records[2].metrics, records[1].metrics);
        assert!(records[2].metrics.biomass > 0.0);
    }

    #[test]
    fn intermediate_null_is_not_carried() {
        let live = [
            obs("t", "psme", 1985, Some(30.0), TreeStatus::Ok),
            obs("t", "psme", 1990, None, TreeStatus::Missing),
            obs("t", "psme", 1995, Some(33.0), TreeStatus::Ok),
        ];
        let mut diags = Diagnostics::default();
        let h = tree_histories("RS01", &live, &[], &table(), &AnalysisConfig::default(), &mut diags);
        assert!(!h[0].records[1].carried);
        assert_eq!(h[0].records[1].metrics, TreeMetrics::default());
    }

    #[test]
    fn final_live_null_is_not_carried() {
        let live = [
            obs("t", "psme", 1985, Some(30.0), TreeStatus::Ok),
            obs("t", "psme", 1990, None, TreeStatus::Ok),
        ];
        let mut diags = Diagnostics::default();
        let h = tree_histories("RS01", &live, &[], &table(), &AnalysisConfig::default(), &mut diags);
        assert!(!h[0].records[1].carried);
    }

    #[test]
    fn dead_table_fills_only_missing_years() {
        let live = [obs("t", "psme", 1990, Some(30.0), TreeStatus::Dead)];
        let dead = [obs("t", "psme", 1990, Some(31.0), TreeStatus::Dead), obs("t", "psme", 1995, Some(31.0), TreeStatus::Dead)];
        let mut diags = Diagnostics::default();
        let h = tree_histories("RS01", &live, &dead, &table(), &AnalysisConfig::default(), &mut diags);
        let years: Vec<_> = h[0].records.iter().map(|r| (r.year, r.dbh)).collect();
        assert_eq!(years, vec![(1990, Some(30.0)), (1995, Some(31.0))]);
    }

    #[test]
    fn excluded_composite_species_is_evaluated() {
        let rows: Vec<EquationRow> = ["wood", "bark"]
            .iter()
            .map(|c| EquationRow {
                species: "acci".into(),
                form: "power".into(),
                wood_density: 0.5,
                b1: 30.0,
                b2: 2.0,
                component: Some(c.to_string()),
                ..Default::default()
            })
            .collect();
        let eqs = EquationTable::from_rows(&rows).unwrap();
        let mut diags = Diagnostics::default();
        let h = tree_histories(
            "RS01",
            &[obs("m", "acci", 1990, Some(10.0), TreeStatus::Ok)],
            &[],
            &eqs,
            &AnalysisConfig::default(),
            &mut diags,
        );
        // Two components of 0.001·30·10² each.
        assert!((h[0].records[0].metrics.biomass - 6.0).abs() < 1e-9);
        assert!(diags.is_empty());
    }

    #[test]
    fn species_without_equation_is_diagnosed_once() {
        let live = [
            obs("t", "abam", 1985, Some(30.0), TreeStatus::Ok),
            obs("t", "abam", 1990, Some(31.0), TreeStatus::Ok),
        ];
        let mut diags = Diagnostics::default();
        let h = tree_histories("RS01", &live, &[], &table(), &AnalysisConfig::default(), &mut diags);
        assert_eq!(h[0].records[1].metrics, TreeMetrics::default());
        assert_eq!(diags.len(), 1);
    }
}
