//! Plot-scale aggregation: each plot normalised by its own area, summed
//! across species within the plot. No stand-area weighting.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::diagnostics::Diagnostics;
use crate::equations::EquationTable;
use crate::error::Result;
use crate::observation::{PlotId, Year};
use crate::reconcile::ObservationIndex;
use crate::reference::ReferenceSet;

use super::stand::usable_plot_area;
use super::{sum_cell, AggregateRecord, MalformedTree};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlotAggregation {
    pub stand: String,
    /// `(year, plot) → record` summed over species.
    #[serde(serialize_with = "crate::entries::serialize")]
    pub plots: BTreeMap<(Year, PlotId), AggregateRecord>,
    /// `(year, plot, species) → record`.
    #[serde(serialize_with = "crate::entries::serialize")]
    pub plot_species: BTreeMap<(Year, PlotId, String), AggregateRecord>,
    pub malformed: Vec<MalformedTree>,
    pub diagnostics: Diagnostics,
}

impl PlotAggregation {
    pub fn plot(&self, year: Year, plot: PlotId) -> Option<&AggregateRecord> {
        self.plots.get(&(year, plot))
    }
}

pub fn aggregate_plots(
    stand: &str,
    index: &ObservationIndex,
    refs: &ReferenceSet,
    equations: &EquationTable,
    cfg: &AnalysisConfig,
) -> Result<PlotAggregation> {
    let mut out = PlotAggregation { stand: stand.to_string(), ..Default::default() };

    for (key, cell) in index.cells() {
        let area = usable_plot_area(stand, key.year, key.plot, refs, cfg, &mut out.diagnostics);
        let min_dbh = refs.min_dbh(key.year, key.plot);
        let expansion = refs.expansion_factor(key.year);

        let sums = sum_cell(stand, key, cell, equations, min_dbh, cfg, &mut out.malformed)?;
        let mut rec = sums.normalised(area, expansion, 1.0);
        rec.plot_count = 1;

        let plot_rec = out.plots.entry((key.year, key.plot)).or_default();
        plot_rec.absorb(&rec);
        plot_rec.plot_count = 1;

        out.plot_species.insert((key.year, key.plot, key.species.clone()), rec);
    }

    tracing::debug!(stand, plots = out.plots.len(), "plots aggregated");
    Ok(out)
}
