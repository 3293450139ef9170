//! Reference resolver: per stand/year/plot areas, minimum diameters and
//! detail-plot expansion factors.
//!
//! Built once per session from raw reference rows, immutable afterwards.
//! Every lookup resolves through an explicit default cascade:
//!
//!   detail-plot entry → unusual-area / unusual-minimum entry → global default
//!
//! Most plots appear in no exception table, so the defaults are the common
//! path, not an error path.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::corrections::{CorrectionTable, StandCorrections};
use crate::equations::round_to;
use crate::observation::{PlotId, Year};

// ── Raw rows ──────────────────────────────────────────────────────────────────

/// One plot measured in one year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotYearRow {
    pub stand: String,
    pub year: Year,
    pub plot: PlotId,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub detail: bool,
    #[serde(default)]
    pub min_dbh: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusualAreaRow {
    pub stand: String,
    pub plot: PlotId,
    pub year: Year,
    pub area: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusualMinDbhRow {
    pub stand: String,
    pub year: Year,
    pub plot: PlotId,
    pub min_dbh: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandAreaRow {
    pub stand: String,
    pub year: Year,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub plot_count: Option<u32>,
}

/// Every reference table of a run, as exported by the data-access layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceRows {
    pub plots: Vec<PlotYearRow>,
    pub unusual_areas: Vec<UnusualAreaRow>,
    pub unusual_min_dbh: Vec<UnusualMinDbhRow>,
    pub stand_areas: Vec<StandAreaRow>,
}

// ── Resolved tables ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetailPlot {
    pub is_detail: bool,
    pub min_dbh: Option<f64>,
    pub area: Option<f64>,
}

/// Fallback values, taken from the run's [`AnalysisConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceDefaults {
    pub plot_area: f64,
    pub min_dbh: f64,
    pub detail_min_dbh: f64,
}

impl From<&AnalysisConfig> for ReferenceDefaults {
    fn from(cfg: &AnalysisConfig) -> Self {
        Self {
            plot_area: cfg.default_plot_area,
            min_dbh: cfg.default_min_dbh,
            detail_min_dbh: cfg.detail_min_dbh_floor,
        }
    }
}

impl Default for ReferenceDefaults {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

/// Resolved reference tables for one stand.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    pub detail_info: HashMap<(Year, PlotId), DetailPlot>,
    pub expansion: BTreeMap<Year, f64>,
    pub unusual_area: HashMap<(PlotId, Year), f64>,
    pub unusual_min_dbh: HashMap<(Year, PlotId), f64>,
    pub total_stand_area: BTreeMap<Year, f64>,
    pub plot_count: BTreeMap<Year, u32>,
    pub defaults: ReferenceDefaults,
}

impl ReferenceSet {
    /// Empty set: every lookup resolves to its default.
    pub fn empty(defaults: ReferenceDefaults) -> Self {
        Self { defaults, ..Default::default() }
    }

    /// Build one stand's tables from rows already filtered to that stand.
    pub fn build(
        plots: &[&PlotYearRow],
        unusual_areas: &[&UnusualAreaRow],
        unusual_min_dbh: &[&UnusualMinDbhRow],
        stand_areas: &[&StandAreaRow],
        defaults: ReferenceDefaults,
    ) -> Self {
        let mut set = Self::empty(defaults);

        for row in unusual_areas {
            set.unusual_area.insert((row.plot, row.year), row.area);
        }
        for row in unusual_min_dbh {
            set.unusual_min_dbh.insert((row.year, row.plot), row.min_dbh);
        }

        let mut total_area: BTreeMap<Year, f64> = BTreeMap::new();
        let mut detail_area: BTreeMap<Year, f64> = BTreeMap::new();
        let mut plots_by_year: BTreeMap<Year, BTreeSet<PlotId>> = BTreeMap::new();

        for row in plots {
            set.detail_info.insert(
                (row.year, row.plot),
                DetailPlot { is_detail: row.detail, min_dbh: row.min_dbh, area: row.area },
            );
            let area = set.plot_area(row.year, row.plot);
            *total_area.entry(row.year).or_default() += area;
            if row.detail {
                *detail_area.entry(row.year).or_default() += area;
            }
            plots_by_year.entry(row.year).or_default().insert(row.plot);
        }

        for (&year, &total) in &total_area {
            let detail = detail_area.get(&year).copied().unwrap_or(0.0);
            set.expansion.insert(year, expansion_factor(total, detail));
        }

        set.total_stand_area = total_area;
        set.plot_count = plots_by_year
            .iter()
            .map(|(&year, plots)| (year, plots.len() as u32))
            .collect();

        // Explicit stand-level rows override the sums derived above.
        for row in stand_areas {
            if let Some(area) = row.area {
                set.total_stand_area.insert(row.year, area);
            }
            if let Some(count) = row.plot_count {
                set.plot_count.insert(row.year, count);
            }
        }

        set
    }

    pub fn has_detail_plots(&self) -> bool {
        self.detail_info.values().any(|d| d.is_detail)
    }

    /// Minimum measured diameter on `plot` in `year`.
    pub fn min_dbh(&self, year: Year, plot: PlotId) -> f64 {
        if let Some(detail) = self.detail_info.get(&(year, plot)).filter(|d| d.is_detail) {
            return detail.min_dbh.unwrap_or(self.defaults.detail_min_dbh);
        }
        self.unusual_min_dbh
            .get(&(year, plot))
            .copied()
            .unwrap_or(self.defaults.min_dbh)
    }

    /// Area (m²) of `plot` in `year`: the plot's own row, then the
    /// unusual-area table, then the default. Stand totals are summed from
    /// the same lookup. May be zero if a table says so; the aggregation
    /// engine coerces that case.
    pub fn plot_area(&self, year: Year, plot: PlotId) -> f64 {
        self.detail_info
            .get(&(year, plot))
            .and_then(|d| d.area)
            .or_else(|| self.unusual_area.get(&(plot, year)).copied())
            .unwrap_or(self.defaults.plot_area)
    }

    /// Small-tree expansion factor for `year`; 1.0 when the stand has no
    /// detail plots or the year is unknown.
    pub fn expansion_factor(&self, year: Year) -> f64 {
        if !self.has_detail_plots() {
            return 1.0;
        }
        self.expansion.get(&year).copied().unwrap_or(1.0)
    }

    /// Total stand area (m²) in `year`, if known.
    pub fn stand_area(&self, year: Year) -> Option<f64> {
        self.total_stand_area.get(&year).copied()
    }

    pub fn plot_count(&self, year: Year) -> Option<u32> {
        self.plot_count.get(&year).copied()
    }
}

/// `round(total / detail, 2)`, or 1.0 without detail area.
pub fn expansion_factor(total_area: f64, detail_area: f64) -> f64 {
    if detail_area > 0.0 && total_area > 0.0 {
        round_to(total_area / detail_area, 2)
    } else {
        1.0
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Reference sets and correction maps for every stand of a run.
/// Shared read-only across stands (and threads).
#[derive(Debug, Clone, Default)]
pub struct ReferenceSession {
    stands: HashMap<String, ReferenceSet>,
    corrections: CorrectionTable,
    empty: ReferenceSet,
}

impl ReferenceSession {
    pub fn build(rows: &ReferenceRows, corrections: CorrectionTable, cfg: &AnalysisConfig) -> Self {
        let defaults = ReferenceDefaults::from(cfg);

        let mut stand_ids: BTreeSet<&str> = BTreeSet::new();
        stand_ids.extend(rows.plots.iter().map(|r| r.stand.as_str()));
        stand_ids.extend(rows.unusual_areas.iter().map(|r| r.stand.as_str()));
        stand_ids.extend(rows.unusual_min_dbh.iter().map(|r| r.stand.as_str()));
        stand_ids.extend(rows.stand_areas.iter().map(|r| r.stand.as_str()));

        let stands = stand_ids
            .into_iter()
            .map(|stand| {
                let plots: Vec<_> = rows.plots.iter().filter(|r| r.stand == stand).collect();
                let areas: Vec<_> = rows.unusual_areas.iter().filter(|r| r.stand == stand).collect();
                let mins: Vec<_> = rows.unusual_min_dbh.iter().filter(|r| r.stand == stand).collect();
                let totals: Vec<_> = rows.stand_areas.iter().filter(|r| r.stand == stand).collect();
                let set = ReferenceSet::build(&plots, &areas, &mins, &totals, defaults);
                tracing::debug!(stand, detail = set.has_detail_plots(), "reference set built");
                (stand.to_string(), set)
            })
            .collect();

        Self { stands, corrections, empty: ReferenceSet::empty(defaults) }
    }

    /// Reference set for `stand`; a stand absent from every table resolves
    /// entirely to defaults.
    pub fn stand(&self, stand: &str) -> &ReferenceSet {
        self.stands.get(stand).unwrap_or(&self.empty)
    }

    pub fn corrections(&self, stand: &str) -> StandCorrections {
        self.corrections.for_stand(stand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plot(year: Year, plot: PlotId, area: f64, detail: bool, min_dbh: Option<f64>) -> PlotYearRow {
        PlotYearRow { stand: "RS01".into(), year, plot, area: Some(area), detail, min_dbh }
    }

    #[test]
    fn expansion_factor_from_detail_share() {
        // 16 plots of 625 m² = 10,000 m²; detail plots 2,000 m².
        let mut rows: Vec<PlotYearRow> = (1..=14).map(|p| plot(1990, p, 8000.0 / 14.0, false, None)).collect();
        rows.push(plot(1990, 15, 1000.0, true, Some(5.0)));
        rows.push(plot(1990, 16, 1000.0, true, Some(5.0)));
        let refs: Vec<_> = rows.iter().collect();
        let set = ReferenceSet::build(&refs, &[], &[], &[], ReferenceDefaults::default());
        assert_relative_eq!(set.expansion_factor(1990), 5.0);
        assert_relative_eq!(set.stand_area(1990).unwrap(), 10_000.0, epsilon = 1e-9);
        assert_eq!(set.plot_count(1990), Some(16));
    }

    #[test]
    fn expansion_factor_without_detail_is_one() {
        assert_eq!(expansion_factor(10_000.0, 0.0), 1.0);
        let rows = [plot(1990, 1, 625.0, false, None)];
        let refs: Vec<_> = rows.iter().collect();
        let set = ReferenceSet::build(&refs, &[], &[], &[], ReferenceDefaults::default());
        assert_eq!(set.expansion_factor(1990), 1.0);
        assert_eq!(set.expansion_factor(2001), 1.0);
    }

    #[test]
    fn expansion_factor_rounds_to_two_places() {
        assert_eq!(expansion_factor(10_000.0, 3_000.0), 3.33);
    }

    #[test]
    fn absent_plot_resolves_to_defaults() {
        let set = ReferenceSet::empty(ReferenceDefaults::default());
        assert_eq!(set.plot_area(1990, 7), 625.0);
        assert_eq!(set.min_dbh(1990, 7), 15.0);
        assert_eq!(set.expansion_factor(1990), 1.0);
        assert_eq!(set.stand_area(1990), None);
    }

    #[test]
    fn detail_entry_wins_over_unusual_tables() {
        let rows = [plot(1990, 3, 250.0, true, Some(5.0))];
        let refs: Vec<_> = rows.iter().collect();
        let area = UnusualAreaRow { stand: "RS01".into(), plot: 3, year: 1990, area: 400.0 };
        let min = UnusualMinDbhRow { stand: "RS01".into(), year: 1990, plot: 3, min_dbh: 10.0 };
        let set = ReferenceSet::build(&refs, &[&area], &[&min], &[], ReferenceDefaults::default());
        assert_eq!(set.plot_area(1990, 3), 250.0);
        assert_eq!(set.min_dbh(1990, 3), 5.0);
    }

    #[test]
    fn unusual_tables_win_over_defaults() {
        let area = UnusualAreaRow { stand: "RS01".into(), plot: 4, year: 1985, area: 500.0 };
        let min = UnusualMinDbhRow { stand: "RS01".into(), year: 1985, plot: 4, min_dbh: 10.0 };
        let set = ReferenceSet::build(&[], &[&area], &[&min], &[], ReferenceDefaults::default());
        assert_eq!(set.plot_area(1985, 4), 500.0);
        assert_eq!(set.min_dbh(1985, 4), 10.0);
        assert_eq!(set.plot_area(1990, 4), 625.0);
    }

    #[test]
    fn detail_plot_without_minimum_uses_floor() {
        let rows = [PlotYearRow { stand: "RS01".into(), year: 1990, plot: 1, area: None, detail: true, min_dbh: None }];
        let refs: Vec<_> = rows.iter().collect();
        let set = ReferenceSet::build(&refs, &[], &[], &[], ReferenceDefaults::default());
        assert_eq!(set.min_dbh(1990, 1), 5.0);
        assert_eq!(set.plot_area(1990, 1), 625.0);
    }

    #[test]
    fn plain_plot_row_area_is_its_plot_area() {
        let rows = [plot(1990, 1, 500.0, false, None)];
        let refs: Vec<_> = rows.iter().collect();
        let set = ReferenceSet::build(&refs, &[], &[], &[], ReferenceDefaults::default());
        assert_eq!(set.plot_area(1990, 1), 500.0);
        assert_eq!(set.stand_area(1990), Some(500.0));
    }

    #[test]
    fn explicit_stand_row_overrides_derived_totals() {
        let rows = [plot(1990, 1, 625.0, false, None)];
        let refs: Vec<_> = rows.iter().collect();
        let total = StandAreaRow { stand: "RS01".into(), year: 1990, area: Some(40_000.0), plot_count: Some(64) };
        let set = ReferenceSet::build(&refs, &[], &[], &[&total], ReferenceDefaults::default());
        assert_eq!(set.stand_area(1990), Some(40_000.0));
        assert_eq!(set.plot_count(1990), Some(64));
    }

    #[test]
    fn session_returns_defaults_for_unknown_stand() {
        let session = ReferenceSession::build(
            &ReferenceRows::default(),
            CorrectionTable::default(),
            &AnalysisConfig::default(),
        );
        assert_eq!(session.stand("ZZ99").plot_area(1990, 1), 625.0);
    }
}
