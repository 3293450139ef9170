//! Temporal reconciliation of one stand's raw observations.
//!
//! Pipeline:
//!   1. Resolve addition / mortality-check years to decent years.
//!   2. Index live-table rows (addition rewrite; dead rows also get the
//!      mortality rewrite; missing rows are staged).
//!   3. Merge dead-table rows into the `dead` bucket.
//!   4. Bridge staged missing trees from earlier live diameters.
//!
//! The result is an [`ObservationIndex`] that is never mutated again.

pub mod bridge;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::corrections::{ResolvedCorrections, StandCorrections};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::observation::{Category, PlotId, TreeObservation, TreeStatus, Year};

// ── Index types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CellKey {
    pub year: Year,
    pub species: String,
    pub plot: PlotId,
}

impl CellKey {
    pub fn new(year: Year, species: &str, plot: PlotId) -> Self {
        Self { year, species: species.to_string(), plot }
    }
}

/// What the index keeps of one observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub dbh: Option<f64>,
    pub status: TreeStatus,
    pub dbh_code: Option<String>,
}

impl From<&TreeObservation> for Measurement {
    fn from(obs: &TreeObservation) -> Self {
        Self { dbh: obs.dbh, status: obs.status, dbh_code: obs.dbh_code.clone() }
    }
}

/// `treeId → measurement`, ordered for deterministic iteration.
pub type Bucket = BTreeMap<String, Measurement>;

/// All trees of one species on one plot in one year.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cell {
    pub live: Bucket,
    pub dead: Bucket,
    pub ingrowth: Bucket,
}

impl Cell {
    pub fn bucket(&self, category: Category) -> &Bucket {
        match category {
            Category::Live => &self.live,
            Category::Dead => &self.dead,
            Category::Ingrowth => &self.ingrowth,
        }
    }

    fn bucket_mut(&mut self, category: Category) -> &mut Bucket {
        match category {
            Category::Live => &mut self.live,
            Category::Dead => &mut self.dead,
            Category::Ingrowth => &mut self.ingrowth,
        }
    }
}

/// Reconciled `(year, species, plot) → {live, dead, ingrowth}` state of one stand.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservationIndex {
    #[serde(serialize_with = "crate::entries::serialize")]
    cells: BTreeMap<CellKey, Cell>,
}

impl ObservationIndex {
    pub fn cells(&self) -> impl Iterator<Item = (&CellKey, &Cell)> {
        self.cells.iter()
    }

    pub fn cell(&self, year: Year, species: &str, plot: PlotId) -> Option<&Cell> {
        self.cells.get(&CellKey::new(year, species, plot))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Live diameter of `tree_id` on (`year`, `species`, `plot`), if recorded.
    pub fn live_dbh(&self, year: Year, species: &str, plot: PlotId, tree_id: &str) -> Option<f64> {
        self.cell(year, species, plot)?.live.get(tree_id)?.dbh
    }

    /// Insert, replacing any entry for the same tree in the same bucket.
    pub(crate) fn insert(&mut self, category: Category, obs: &TreeObservation) {
        self.cells
            .entry(CellKey::new(obs.year, &obs.species, obs.plot))
            .or_default()
            .bucket_mut(category)
            .insert(obs.tree_id.clone(), Measurement::from(obs));
    }

    /// Dead-table merge: an existing dead entry that already carries a
    /// diameter is kept.
    pub(crate) fn merge_dead(&mut self, obs: &TreeObservation) {
        let dead = self
            .cells
            .entry(CellKey::new(obs.year, &obs.species, obs.plot))
            .or_default()
            .bucket_mut(Category::Dead);
        match dead.get(&obs.tree_id) {
            Some(existing) if existing.dbh.is_some() => {}
            _ => {
                dead.insert(obs.tree_id.clone(), Measurement::from(obs));
            }
        }
    }
}

// ── Reconciliation ────────────────────────────────────────────────────────────

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub index: ObservationIndex,
    /// Sorted, deduplicated decent years used for resolution and bridging.
    pub decent_years: Vec<Year>,
    pub corrections: ResolvedCorrections,
    pub bridged: usize,
    pub diagnostics: Diagnostics,
}

/// Build the frozen observation index for one stand.
pub fn reconcile(
    stand: &str,
    live: &[TreeObservation],
    dead: &[TreeObservation],
    decent_years: &[Year],
    corrections: &StandCorrections,
    cfg: &AnalysisConfig,
) -> Reconciliation {
    let mut diags = Diagnostics::default();

    let mut decent = decent_years.to_vec();
    decent.sort_unstable();
    decent.dedup();

    let resolved = ResolvedCorrections::resolve(stand, corrections, &decent, &mut diags);

    let mut index = ObservationIndex::default();
    let mut pending: Vec<TreeObservation> = Vec::new();
    let mut excluded: BTreeMap<String, usize> = BTreeMap::new();

    for obs in live {
        if cfg.is_excluded(&obs.species) {
            *excluded.entry(obs.species.clone()).or_default() += 1;
            continue;
        }
        let year = resolved.addition_target(obs.year, obs.plot).unwrap_or(obs.year);
        match obs.status {
            TreeStatus::Missing => pending.push(obs.in_year(year)),
            TreeStatus::Dead => {
                let year = resolved.mortality_target(obs.year, obs.plot).unwrap_or(year);
                index.insert(Category::Dead, &obs.in_year(year));
            }
            TreeStatus::Ingrowth => {
                let obs = obs.in_year(year);
                index.insert(Category::Ingrowth, &obs);
                index.insert(Category::Live, &obs);
            }
            TreeStatus::Ok | TreeStatus::Fused | TreeStatus::Bridged => {
                index.insert(Category::Live, &obs.in_year(year));
            }
        }
    }

    for obs in dead {
        if cfg.is_excluded(&obs.species) {
            *excluded.entry(obs.species.clone()).or_default() += 1;
            continue;
        }
        let year = resolved.mortality_target(obs.year, obs.plot).unwrap_or(obs.year);
        index.merge_dead(&obs.in_year(year));
    }

    for (species, rows) in excluded {
        diags.push(stand, Diagnostic::SpeciesExcluded { species, rows });
    }

    let bridged = bridge::bridge_missing(stand, &mut index, pending, &decent, cfg.missing_lookback, &mut diags);

    tracing::debug!(stand, cells = index.len(), bridged, "stand reconciled");

    Reconciliation { index, decent_years: decent, corrections: resolved, bridged, diagnostics: diags }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::MORTALITY_DBH_CODE;

    pub(crate) fn obs(tree: &str, plot: PlotId, year: Year, dbh: Option<f64>, status: TreeStatus) -> TreeObservation {
        TreeObservation {
            tree_id: tree.into(),
            species: "psme".into(),
            plot,
            year,
            dbh,
            status,
            dbh_code: None,
        }
    }

    fn corrections_json(json: &str) -> StandCorrections {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn statuses_land_in_their_buckets() {
        let live = vec![
            obs("a", 1, 1990, Some(20.0), TreeStatus::Ok),
            obs("b", 1, 1990, Some(16.0), TreeStatus::Fused),
            obs("c", 1, 1990, Some(6.0), TreeStatus::Ingrowth),
            obs("d", 1, 1990, Some(30.0), TreeStatus::Dead),
        ];
        let rec = reconcile("RS01", &live, &[], &[1990], &StandCorrections::default(), &AnalysisConfig::default());
        let cell = rec.index.cell(1990, "psme", 1).unwrap();
        assert_eq!(cell.live.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(cell.ingrowth.keys().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(cell.dead.keys().collect::<Vec<_>>(), vec!["d"]);
    }

    #[test]
    fn addition_rows_are_refiled_to_preceding_decent_year() {
        let live = vec![
            obs("a", 5, 1981, Some(20.0), TreeStatus::Ok),
            obs("b", 6, 1981, Some(20.0), TreeStatus::Ok),
        ];
        let corrections = corrections_json(r#"{ "additions": { "1981": [5] } }"#);
        let rec = reconcile("AV06", &live, &[], &[1978, 1983, 1988], &corrections, &AnalysisConfig::default());
        assert!(rec.index.cell(1978, "psme", 5).unwrap().live.contains_key("a"));
        // Plot 6 is not listed for the addition year, so it stays put.
        assert!(rec.index.cell(1981, "psme", 6).unwrap().live.contains_key("b"));
    }

    #[test]
    fn mortality_rows_roll_forward_only_when_dead() {
        let live = vec![
            obs("a", 1, 1980, Some(20.0), TreeStatus::Dead),
            obs("b", 1, 1980, Some(20.0), TreeStatus::Ok),
        ];
        let corrections = corrections_json(r#"{ "mortality": { "1980": [1] } }"#);
        let rec = reconcile("AV06", &live, &[], &[1978, 1983], &corrections, &AnalysisConfig::default());
        assert!(rec.index.cell(1983, "psme", 1).unwrap().dead.contains_key("a"));
        assert!(rec.index.cell(1980, "psme", 1).unwrap().live.contains_key("b"));
    }

    #[test]
    fn dead_table_rows_merge_with_mortality_rewrite() {
        let dead = vec![TreeObservation::from(&crate::observation::DeadRow {
            tree_id: "x".into(),
            species: "psme".into(),
            plot: 1,
            dbh: Some(44.0),
            year: 1980,
        })];
        let corrections = corrections_json(r#"{ "mortality": { "1980": [1] } }"#);
        let rec = reconcile("AV06", &[], &dead, &[1978, 1983], &corrections, &AnalysisConfig::default());
        let m = &rec.index.cell(1983, "psme", 1).unwrap().dead["x"];
        assert_eq!(m.status, TreeStatus::Dead);
        assert_eq!(m.dbh_code.as_deref(), Some(MORTALITY_DBH_CODE));
    }

    #[test]
    fn dead_table_does_not_overwrite_measured_live_table_death() {
        let live = vec![obs("x", 1, 1983, Some(40.0), TreeStatus::Dead)];
        let mut late = obs("x", 1, 1983, Some(41.5), TreeStatus::Dead);
        late.dbh_code = Some(MORTALITY_DBH_CODE.into());
        let rec = reconcile("AV06", &live, &[late], &[1983], &StandCorrections::default(), &AnalysisConfig::default());
        assert_eq!(rec.index.cell(1983, "psme", 1).unwrap().dead["x"].dbh, Some(40.0));
    }

    #[test]
    fn excluded_species_never_reach_the_index() {
        let mut maple = obs("m", 1, 1990, Some(20.0), TreeStatus::Ok);
        maple.species = "acci".into();
        let rec = reconcile("RS01", &[maple], &[], &[1990], &StandCorrections::default(), &AnalysisConfig::default());
        assert!(rec.index.is_empty());
        assert_eq!(
            rec.diagnostics.entries,
            vec![Diagnostic::SpeciesExcluded { species: "acci".into(), rows: 1 }]
        );
    }

    #[test]
    fn decent_years_are_sorted_and_deduplicated() {
        let rec = reconcile("RS01", &[], &[], &[1995, 1985, 1990, 1990], &StandCorrections::default(), &AnalysisConfig::default());
        assert_eq!(rec.decent_years, vec![1985, 1990, 1995]);
    }
}
