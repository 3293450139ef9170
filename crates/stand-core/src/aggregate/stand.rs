//! Stand-scale aggregation: per (year, species) totals weighted by each
//! plot's share of the stand area, plus the "ALL" species roll-up and the
//! large-tree-only report.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::equations::EquationTable;
use crate::error::Result;
use crate::observation::{PlotId, Year};
use crate::reconcile::ObservationIndex;
use crate::reference::ReferenceSet;

use super::{sum_cell, AggregateRecord, MalformedTree};

/// Species label of the roll-up record.
pub const ALL_SPECIES: &str = "ALL";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StandAggregation {
    pub stand: String,
    /// `(year, species) → record`, including `(year, "ALL")`.
    #[serde(serialize_with = "crate::entries::serialize")]
    pub species: BTreeMap<(Year, String), AggregateRecord>,
    /// Same keys, trees ≥ the large threshold only.
    #[serde(serialize_with = "crate::entries::serialize")]
    pub large_only: BTreeMap<(Year, String), AggregateRecord>,
    pub malformed: Vec<MalformedTree>,
    pub diagnostics: Diagnostics,
}

impl StandAggregation {
    pub fn record(&self, year: Year, species: &str) -> Option<&AggregateRecord> {
        self.species.get(&(year, species.to_string()))
    }

    pub fn all(&self, year: Year) -> Option<&AggregateRecord> {
        self.record(year, ALL_SPECIES)
    }
}

/// Positive area or the default, with a diagnostic when coerced.
pub(crate) fn usable_stand_area(
    stand: &str,
    year: Year,
    refs: &ReferenceSet,
    cfg: &AnalysisConfig,
    diags: &mut Diagnostics,
) -> f64 {
    match refs.stand_area(year) {
        Some(area) if area > 0.0 => area,
        _ => {
            diags.push(stand, Diagnostic::StandAreaCoerced { year, area: cfg.default_stand_area });
            cfg.default_stand_area
        }
    }
}

pub(crate) fn usable_plot_area(
    stand: &str,
    year: Year,
    plot: PlotId,
    refs: &ReferenceSet,
    cfg: &AnalysisConfig,
    diags: &mut Diagnostics,
) -> f64 {
    let area = refs.plot_area(year, plot);
    if area > 0.0 {
        area
    } else {
        diags.push(stand, Diagnostic::PlotAreaCoerced { year, plot, area: cfg.default_plot_area });
        cfg.default_plot_area
    }
}

/// Aggregate one stand's frozen index.
///
/// Fails only when a species present in the data has no equation.
pub fn aggregate_stand(
    stand: &str,
    index: &ObservationIndex,
    refs: &ReferenceSet,
    equations: &EquationTable,
    cfg: &AnalysisConfig,
) -> Result<StandAggregation> {
    let mut out = StandAggregation { stand: stand.to_string(), ..Default::default() };
    let mut stand_areas: BTreeMap<Year, f64> = BTreeMap::new();
    let mut plots_seen: BTreeMap<Year, BTreeSet<PlotId>> = BTreeMap::new();

    for (key, cell) in index.cells() {
        let stand_area = match stand_areas.get(&key.year) {
            Some(&a) => a,
            None => {
                let a = usable_stand_area(stand, key.year, refs, cfg, &mut out.diagnostics);
                stand_areas.insert(key.year, a);
                a
            }
        };
        let area = usable_plot_area(stand, key.year, key.plot, refs, cfg, &mut out.diagnostics);
        let min_dbh = refs.min_dbh(key.year, key.plot);
        let expansion = refs.expansion_factor(key.year);
        let weight = area / stand_area;

        let sums = sum_cell(stand, key, cell, equations, min_dbh, cfg, &mut out.malformed)?;

        let species_key = (key.year, key.species.clone());
        let rec = out.species.entry(species_key.clone()).or_default();
        rec.absorb(&sums.normalised(area, expansion, weight));
        rec.plot_count += 1;

        let lo = out.large_only.entry(species_key).or_default();
        lo.absorb(&sums.large_only(area, weight));
        lo.plot_count += 1;

        plots_seen.entry(key.year).or_default().insert(key.plot);
    }

    for (year, plots) in &plots_seen {
        let plot_count = refs.plot_count(*year).unwrap_or(plots.len() as u32);
        roll_up(&mut out.species, *year, plot_count);
        roll_up(&mut out.large_only, *year, plot_count);
    }

    tracing::debug!(
        stand,
        records = out.species.len(),
        malformed = out.malformed.len(),
        "stand aggregated"
    );
    Ok(out)
}

/// Sum every species record of `year` into `(year, "ALL")`.
fn roll_up(records: &mut BTreeMap<(Year, String), AggregateRecord>, year: Year, plot_count: u32) {
    let mut all = AggregateRecord { plot_count, ..Default::default() };
    for ((y, species), rec) in records.iter() {
        if *y == year && species != ALL_SPECIES {
            all.absorb(rec);
        }
    }
    records.insert((year, ALL_SPECIES.to_string()), all);
}
