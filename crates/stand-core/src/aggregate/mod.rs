//! Aggregation engine: per-m² totals from a frozen [`ObservationIndex`].
//!
//! Every (year, species, plot) cell is partitioned per category into
//!   large: d ≥ large_dbh               (tier by `max_ref`)
//!   small: min_dbh < d < large_dbh     (normal tier, scaled by the expansion factor)
//! and each metric becomes
//!   cellTotal = Σlarge/area + Σsmall·EF/area
//! Stand-scale totals additionally weight each cell by plotArea/standArea;
//! plot-scale totals do not.

pub mod plot;
pub mod stand;

use std::f64::consts::PI;

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::equations::EquationTable;
use crate::error::Result;
use crate::observation::{Category, PlotId, Year};
use crate::reconcile::{Cell, CellKey};

pub use plot::{aggregate_plots, PlotAggregation};
pub use stand::{aggregate_stand, StandAggregation, ALL_SPECIES};

// ── Records ───────────────────────────────────────────────────────────────────

/// Sums of one category. Per m² once normalised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub trees: f64,
    pub basal: f64,
    pub biomass: f64,
    pub volume: f64,
    pub jenkins: f64,
}

impl Totals {
    pub fn scaled(&self, k: f64) -> Self {
        Self {
            trees: self.trees * k,
            basal: self.basal * k,
            biomass: self.biomass * k,
            volume: self.volume * k,
            jenkins: self.jenkins * k,
        }
    }
}

impl std::ops::AddAssign for Totals {
    fn add_assign(&mut self, rhs: Self) {
        self.trees += rhs.trees;
        self.basal += rhs.basal;
        self.biomass += rhs.biomass;
        self.volume += rhs.volume;
        self.jenkins += rhs.jenkins;
    }
}

impl std::ops::Add for Totals {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

/// One value per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ByCategory<T> {
    pub live: T,
    pub dead: T,
    pub ingrowth: T,
}

impl<T> ByCategory<T> {
    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::Live => &self.live,
            Category::Dead => &self.dead,
            Category::Ingrowth => &self.ingrowth,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Live => &mut self.live,
            Category::Dead => &mut self.dead,
            Category::Ingrowth => &mut self.ingrowth,
        }
    }
}

/// Per-m² totals for one (year, species[, plot]) or (year, plot).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateRecord {
    pub totals: ByCategory<Totals>,
    pub tree_ids: ByCategory<Vec<String>>,
    pub plot_count: u32,
}

impl AggregateRecord {
    /// Add every numeric field of `other` and append its tree lists.
    /// Plot count is left to the caller.
    pub fn absorb(&mut self, other: &AggregateRecord) {
        for cat in Category::ALL {
            *self.totals.get_mut(cat) += *other.totals.get(cat);
            self.tree_ids.get_mut(cat).extend(other.tree_ids.get(cat).iter().cloned());
        }
    }
}

/// A tree whose diameter is null where a number was needed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedTree {
    pub stand: String,
    pub year: Year,
    pub species: String,
    pub plot: PlotId,
    pub category: Category,
    pub tree_id: String,
}

// ── Classification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Large,
    Small,
}

/// Large at or above `large_dbh`; small strictly between the plot minimum
/// and `large_dbh`; `None` at or below the minimum.
pub fn classify(dbh: f64, min_dbh: f64, large_dbh: f64) -> Option<SizeClass> {
    if dbh >= large_dbh {
        Some(SizeClass::Large)
    } else if dbh > min_dbh {
        Some(SizeClass::Small)
    } else {
        None
    }
}

/// Basal area (m²) of a stem of `dbh` cm.
pub fn basal_area(dbh: f64) -> f64 {
    PI * (dbh / 200.0).powi(2)
}

// ── Cell summation ────────────────────────────────────────────────────────────

/// Raw (un-normalised) sums of one cell, split by size class.
#[derive(Debug, Clone, Default)]
pub(crate) struct CellSums {
    pub large: ByCategory<Totals>,
    pub small: ByCategory<Totals>,
    pub large_ids: ByCategory<Vec<String>>,
    pub small_ids: ByCategory<Vec<String>>,
}

impl CellSums {
    /// `Σlarge/area + Σsmall·ef/area`, times `weight`.
    pub fn normalised(&self, area: f64, expansion: f64, weight: f64) -> AggregateRecord {
        let mut rec = AggregateRecord::default();
        for cat in Category::ALL {
            let per_m2 = self.large.get(cat).scaled(1.0 / area) + self.small.get(cat).scaled(expansion / area);
            *rec.totals.get_mut(cat) = per_m2.scaled(weight);
            let ids = rec.tree_ids.get_mut(cat);
            ids.extend(self.large_ids.get(cat).iter().cloned());
            ids.extend(self.small_ids.get(cat).iter().cloned());
        }
        rec
    }

    /// Large trees only: `Σlarge/area`, times `weight`.
    pub fn large_only(&self, area: f64, weight: f64) -> AggregateRecord {
        let mut rec = AggregateRecord::default();
        for cat in Category::ALL {
            *rec.totals.get_mut(cat) = self.large.get(cat).scaled(weight / area);
            rec.tree_ids.get_mut(cat).extend(self.large_ids.get(cat).iter().cloned());
        }
        rec
    }
}

/// Evaluate every tree of `cell`. Null diameters are appended to `malformed`.
/// A species with no usable equation is a configuration error.
pub(crate) fn sum_cell(
    stand: &str,
    key: &CellKey,
    cell: &Cell,
    equations: &EquationTable,
    min_dbh: f64,
    cfg: &AnalysisConfig,
    malformed: &mut Vec<MalformedTree>,
) -> Result<CellSums> {
    let mut sums = CellSums::default();

    for cat in Category::ALL {
        for (tree_id, m) in cell.bucket(cat) {
            let Some(dbh) = m.dbh else {
                malformed.push(MalformedTree {
                    stand: stand.to_string(),
                    year: key.year,
                    species: key.species.clone(),
                    plot: key.plot,
                    category: cat,
                    tree_id: tree_id.clone(),
                });
                continue;
            };

            let (totals, ids, equation) = match classify(dbh, min_dbh, cfg.large_dbh) {
                Some(SizeClass::Large) => (
                    sums.large.get_mut(cat),
                    sums.large_ids.get_mut(cat),
                    equations.for_large(&key.species, dbh)?,
                ),
                Some(SizeClass::Small) => (
                    sums.small.get_mut(cat),
                    sums.small_ids.get_mut(cat),
                    equations.for_small(&key.species)?,
                ),
                None => continue,
            };

            let metrics = equation.evaluate(dbh);
            *totals += Totals {
                trees: 1.0,
                basal: basal_area(dbh),
                biomass: metrics.biomass,
                volume: metrics.volume,
                jenkins: metrics.jenkins,
            };
            ids.push(tree_id.clone());
        }
    }

    Ok(sums)
}
