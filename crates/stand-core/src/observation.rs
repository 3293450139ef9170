//! Raw tree observations as handed over by the data-access layer.

use serde::{Deserialize, Serialize};

pub type Year = u16;
pub type PlotId = u32;

/// Diameter code stamped on every dead-table row.
pub const MORTALITY_DBH_CODE: &str = "M";
/// Diameter code stamped on entries synthesised by the missing-tree bridge.
pub const BRIDGED_DBH_CODE: &str = "B";

/// Tree status as recorded in the field.
///
/// `Bridged` never appears in raw input: reconciliation stamps it on
/// diameters copied forward for a tree reported missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeStatus {
    #[serde(alias = "OK", alias = "o", alias = "O", alias = "1")]
    Ok,
    #[serde(alias = "INGROWTH", alias = "i", alias = "I", alias = "2")]
    Ingrowth,
    #[serde(alias = "FUSED", alias = "f", alias = "F", alias = "3")]
    Fused,
    #[serde(alias = "DEAD", alias = "d", alias = "D", alias = "6")]
    Dead,
    #[serde(alias = "MISSING", alias = "m", alias = "M", alias = "9")]
    Missing,
    #[serde(skip_deserializing)]
    Bridged,
}

impl TreeStatus {
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Ok | Self::Ingrowth | Self::Fused | Self::Bridged)
    }
}

/// Which bucket of an index cell an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Live,
    Dead,
    Ingrowth,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Live, Category::Dead, Category::Ingrowth];

    /// Portion label used in rendered reports.
    pub fn portion(self) -> &'static str {
        match self {
            Category::Live => "LIVE",
            Category::Dead => "MORTALITY",
            Category::Ingrowth => "INGROWTH",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Live => "live",
            Category::Dead => "dead",
            Category::Ingrowth => "ingrowth",
        };
        f.write_str(s)
    }
}

/// One immutable field measurement of one tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeObservation {
    pub tree_id: String,
    pub species: String,
    pub plot: PlotId,
    pub year: Year,
    pub dbh: Option<f64>,
    pub status: TreeStatus,
    pub dbh_code: Option<String>,
}

impl TreeObservation {
    /// Copy of this observation relocated to `year`.
    pub fn in_year(&self, year: Year) -> Self {
        Self { year, ..self.clone() }
    }
}

// ── Raw rows ──────────────────────────────────────────────────────────────────

/// Live-table row: `(treeId, species, plotId, diameter, status, year, diameterCode)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveRow {
    pub tree_id: String,
    pub species: String,
    pub plot: PlotId,
    pub dbh: Option<f64>,
    pub status: TreeStatus,
    pub year: Year,
    #[serde(default)]
    pub dbh_code: Option<String>,
}

/// Dead-table row: `(treeId, species, plotId, diameter, year)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadRow {
    pub tree_id: String,
    pub species: String,
    pub plot: PlotId,
    pub dbh: Option<f64>,
    pub year: Year,
}

impl From<&LiveRow> for TreeObservation {
    fn from(row: &LiveRow) -> Self {
        Self {
            tree_id: row.tree_id.clone(),
            species: row.species.to_lowercase(),
            plot: row.plot,
            year: row.year,
            dbh: row.dbh.filter(|d| d.is_finite()),
            status: row.status,
            dbh_code: row.dbh_code.clone(),
        }
    }
}

impl From<&DeadRow> for TreeObservation {
    fn from(row: &DeadRow) -> Self {
        Self {
            tree_id: row.tree_id.clone(),
            species: row.species.to_lowercase(),
            plot: row.plot,
            year: row.year,
            dbh: row.dbh.filter(|d| d.is_finite()),
            status: TreeStatus::Dead,
            dbh_code: Some(MORTALITY_DBH_CODE.to_string()),
        }
    }
}
