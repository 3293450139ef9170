//! Tabular rendering of aggregate records.
//!
//! Column order:
//!   studyCode, entityCode, standId, species, year, portion,
//!   stemsPerHectare, basalAreaM2Ha, volumeM3Ha, biomassMgHa,
//!   jenkinsBiomassMgHa, plotCount
//!
//! Per-m² values are multiplied by 10,000. Stems round up to the next whole
//! stem; everything else rounds to 3 decimals.

use serde::Serialize;

use crate::aggregate::{AggregateRecord, MalformedTree, PlotAggregation, StandAggregation, Totals};
use crate::config::{AnalysisConfig, SQUARE_METERS_PER_HECTARE};
use crate::equations::round_to;
use crate::error::{CoreError, Result};
use crate::observation::{Category, Year};

pub const HEADER: [&str; 12] = [
    "studyCode",
    "entityCode",
    "standId",
    "species",
    "year",
    "portion",
    "stemsPerHectare",
    "basalAreaM2Ha",
    "volumeM3Ha",
    "biomassMgHa",
    "jenkinsBiomassMgHa",
    "plotCount",
];

pub const MALFORMED_HEADER: [&str; 6] = ["standId", "year", "species", "plot", "category", "treeId"];

/// Row order of portions within one (species, year).
const PORTIONS: [Category; 3] = [Category::Ingrowth, Category::Live, Category::Dead];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub study_code: String,
    pub entity_code: String,
    pub stand: String,
    /// Species code, "ALL", or the plot id on plot-scale rows.
    pub species: String,
    pub year: Year,
    pub portion: String,
    pub stems_per_ha: f64,
    pub basal_m2_ha: f64,
    pub volume_m3_ha: f64,
    pub biomass_mg_ha: f64,
    pub jenkins_mg_ha: f64,
    pub plot_count: u32,
}

impl ReportRow {
    pub fn fields(&self) -> [String; 12] {
        [
            self.study_code.clone(),
            self.entity_code.clone(),
            self.stand.clone(),
            self.species.clone(),
            self.year.to_string(),
            self.portion.clone(),
            format!("{}", self.stems_per_ha),
            format!("{:.3}", self.basal_m2_ha),
            format!("{:.3}", self.volume_m3_ha),
            format!("{:.3}", self.biomass_mg_ha),
            format!("{:.3}", self.jenkins_mg_ha),
            self.plot_count.to_string(),
        ]
    }
}

/// Stems per hectare, rounded up. Float noise below 1e-6 stems is dropped
/// first so an exact count never rounds up by one.
pub fn stems_per_hectare(per_m2: f64) -> f64 {
    round_to(per_m2 * SQUARE_METERS_PER_HECTARE, 6).ceil()
}

pub fn per_hectare(per_m2: f64) -> f64 {
    round_to(per_m2 * SQUARE_METERS_PER_HECTARE, 3)
}

struct RowContext<'a> {
    cfg: &'a AnalysisConfig,
    entity: &'a str,
    stand: &'a str,
}

impl RowContext<'_> {
    fn rows(&self, label: &str, year: Year, rec: &AggregateRecord, out: &mut Vec<ReportRow>) {
        for cat in PORTIONS {
            let t: &Totals = rec.totals.get(cat);
            out.push(ReportRow {
                study_code: self.cfg.study_code.clone(),
                entity_code: self.entity.to_string(),
                stand: self.stand.to_string(),
                species: label.to_string(),
                year,
                portion: cat.portion().to_string(),
                stems_per_ha: stems_per_hectare(t.trees),
                basal_m2_ha: per_hectare(t.basal),
                volume_m3_ha: per_hectare(t.volume),
                biomass_mg_ha: per_hectare(t.biomass),
                jenkins_mg_ha: per_hectare(t.jenkins),
                plot_count: rec.plot_count,
            });
        }
    }
}

/// Stand-scale rows, species (including "ALL") by year by portion.
pub fn stand_rows(agg: &StandAggregation, cfg: &AnalysisConfig) -> Vec<ReportRow> {
    let ctx = RowContext { cfg, entity: &cfg.stand_entity, stand: &agg.stand };
    let mut out = Vec::with_capacity(agg.species.len() * PORTIONS.len());
    for ((year, species), rec) in &agg.species {
        ctx.rows(species, *year, rec, &mut out);
    }
    out
}

/// Stand-scale rows restricted to large trees.
pub fn large_only_rows(agg: &StandAggregation, cfg: &AnalysisConfig) -> Vec<ReportRow> {
    let ctx = RowContext { cfg, entity: &cfg.stand_entity, stand: &agg.stand };
    let mut out = Vec::with_capacity(agg.large_only.len() * PORTIONS.len());
    for ((year, species), rec) in &agg.large_only {
        ctx.rows(species, *year, rec, &mut out);
    }
    out
}

/// Plot-scale rows; the species column carries the plot id.
pub fn plot_rows(agg: &PlotAggregation, cfg: &AnalysisConfig) -> Vec<ReportRow> {
    let ctx = RowContext { cfg, entity: &cfg.plot_entity, stand: &agg.stand };
    let mut out = Vec::with_capacity(agg.plots.len() * PORTIONS.len());
    for ((year, plot), rec) in &agg.plots {
        ctx.rows(&plot.to_string(), *year, rec, &mut out);
    }
    out
}

// ── CSV ───────────────────────────────────────────────────────────────────────

fn render<R, F>(header: &[&str], records: R) -> Result<String>
where
    R: IntoIterator<Item = F>,
    F: IntoIterator<Item = String>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).map_err(|e| CoreError::Render(e.to_string()))?;
    for record in records {
        writer.write_record(record).map_err(|e| CoreError::Render(e.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| CoreError::Render(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CoreError::Render(e.to_string()))
}

/// Render report rows, header first.
pub fn to_csv(rows: &[ReportRow]) -> Result<String> {
    render(&HEADER, rows.iter().map(ReportRow::fields))
}

/// Render the malformed-tree list, header first.
pub fn malformed_csv(trees: &[MalformedTree]) -> Result<String> {
    render(
        &MALFORMED_HEADER,
        trees.iter().map(|t| {
            [
                t.stand.clone(),
                t.year.to_string(),
                t.species.clone(),
                t.plot.to_string(),
                t.category.to_string(),
                t.tree_id.clone(),
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn exact_stem_count_does_not_round_up() {
        assert_eq!(stems_per_hectare(1.0 / 625.0), 16.0);
        assert_eq!(stems_per_hectare(3.0 / 625.0), 48.0);
    }

    #[test]
    fn fractional_stems_round_up() {
        assert_eq!(stems_per_hectare(1.0 / 1250.0 + 1e-6), 9.0);
        assert_eq!(stems_per_hectare(0.0), 0.0);
    }

    #[test]
    fn other_fields_round_to_three_places() {
        assert_eq!(per_hectare(0.000_123_456), 1.235);
    }

    #[test]
    fn stand_rows_emit_three_portions_in_order() {
        let mut rec = AggregateRecord { plot_count: 4, ..Default::default() };
        rec.totals.live.trees = 1.0 / 625.0;
        rec.totals.live.biomass = 0.05;
        let mut species = BTreeMap::new();
        species.insert((1990, "psme".to_string()), rec);
        let agg = StandAggregation { stand: "RS01".into(), species, ..Default::default() };

        let rows = stand_rows(&agg, &AnalysisConfig::default());
        let portions: Vec<_> = rows.iter().map(|r| r.portion.as_str()).collect();
        assert_eq!(portions, vec!["INGROWTH", "LIVE", "MORTALITY"]);
        assert_eq!(rows[1].stems_per_ha, 16.0);
        assert_eq!(rows[1].biomass_mg_ha, 500.0);
        assert_eq!(rows[1].plot_count, 4);

        let csv = to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap().split(',').count(), 12);
        assert_eq!(
            lines.nth(1).unwrap(),
            "TP001,STAND,RS01,psme,1990,LIVE,16,0.000,0.000,500.000,0.000,4"
        );
    }

    #[test]
    fn malformed_fields_with_commas_are_quoted() {
        let trees = [MalformedTree {
            stand: "RS01".into(),
            year: 1990,
            species: "psme,var".into(),
            plot: 3,
            category: Category::Dead,
            tree_id: "RS01-3-7".into(),
        }];
        let csv = malformed_csv(&trees).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "standId,year,species,plot,category,treeId");
        assert_eq!(lines.next().unwrap(), "RS01,1990,\"psme,var\",3,dead,RS01-3-7");
    }
}
