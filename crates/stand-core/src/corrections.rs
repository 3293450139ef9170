//! Historical addition / mortality-check corrections and their resolution to
//! canonical ("decent") inventory years.
//!
//! Addition years fold into the nearest decent year at or before them.
//! Mortality-check years fold into the nearest decent year strictly after
//! them. A correction with no such year is dropped for the stand.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::observation::{PlotId, Year};

/// `year → plots affected`.
pub type CorrectionMap = BTreeMap<Year, BTreeSet<PlotId>>;

/// Corrections recorded for one stand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandCorrections {
    pub additions: CorrectionMap,
    pub mortality: CorrectionMap,
}

/// Fixed historical correction table, keyed by stand id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrectionTable {
    pub stands: BTreeMap<String, StandCorrections>,
}

impl CorrectionTable {
    pub fn for_stand(&self, stand: &str) -> StandCorrections {
        self.stands.get(stand).cloned().unwrap_or_default()
    }
}

/// Where a correction year's rows are re-filed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub year: Year,
    pub plots: BTreeSet<PlotId>,
}

/// `correction year → replacement`.
pub type ReplacementMap = BTreeMap<Year, Replacement>;

/// Resolved correction maps for one stand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedCorrections {
    pub additions: ReplacementMap,
    pub mortality: ReplacementMap,
}

impl ResolvedCorrections {
    pub fn resolve(
        stand: &str,
        corrections: &StandCorrections,
        decent_years: &[Year],
        diags: &mut Diagnostics,
    ) -> Self {
        Self {
            additions: resolve_additions(stand, &corrections.additions, decent_years, diags),
            mortality: resolve_mortality(stand, &corrections.mortality, decent_years, diags),
        }
    }

    /// Replacement year for an addition row on (`year`, `plot`).
    pub fn addition_target(&self, year: Year, plot: PlotId) -> Option<Year> {
        target(&self.additions, year, plot)
    }

    /// Replacement year for a dead row on (`year`, `plot`).
    pub fn mortality_target(&self, year: Year, plot: PlotId) -> Option<Year> {
        target(&self.mortality, year, plot)
    }
}

fn target(map: &ReplacementMap, year: Year, plot: PlotId) -> Option<Year> {
    map.get(&year).filter(|r| r.plots.contains(&plot)).map(|r| r.year)
}

/// Decent year at or immediately before `year`.
pub fn preceding_decent_year(decent_years: &[Year], year: Year) -> Option<Year> {
    let idx = decent_years.partition_point(|&y| y < year);
    match decent_years.get(idx) {
        Some(&y) if y == year => Some(y),
        _ if idx > 0 => Some(decent_years[idx - 1]),
        _ => None,
    }
}

/// Decent year strictly after `year`.
pub fn following_decent_year(decent_years: &[Year], year: Year) -> Option<Year> {
    let idx = decent_years.partition_point(|&y| y <= year);
    decent_years.get(idx).copied()
}

/// `decent_years` must be sorted ascending.
pub fn resolve_additions(
    stand: &str,
    additions: &CorrectionMap,
    decent_years: &[Year],
    diags: &mut Diagnostics,
) -> ReplacementMap {
    let mut out = ReplacementMap::new();
    for (&year, plots) in additions {
        match preceding_decent_year(decent_years, year) {
            Some(replacement) => {
                out.insert(year, Replacement { year: replacement, plots: plots.clone() });
            }
            None => diags.push(stand, Diagnostic::AdditionDropped { year }),
        }
    }
    out
}

/// `decent_years` must be sorted ascending.
pub fn resolve_mortality(
    stand: &str,
    mortality: &CorrectionMap,
    decent_years: &[Year],
    diags: &mut Diagnostics,
) -> ReplacementMap {
    let mut out = ReplacementMap::new();
    if mortality.is_empty() {
        return out;
    }

    let last_decent = decent_years.last().copied();
    let all_after_last = match last_decent {
        Some(last) => mortality.keys().all(|&y| y > last),
        None => true,
    };
    if all_after_last {
        diags.push(stand, Diagnostic::MortalityDiscarded { years: mortality.keys().copied().collect() });
        return out;
    }

    for (&year, plots) in mortality {
        match following_decent_year(decent_years, year) {
            Some(replacement) => {
                out.insert(year, Replacement { year: replacement, plots: plots.clone() });
            }
            None => diags.push(stand, Diagnostic::MortalityDropped { year }),
        }
    }
    out
}
