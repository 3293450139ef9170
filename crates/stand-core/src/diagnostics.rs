//! Non-fatal findings collected while processing a stand.
//!
//! Every diagnostic is also emitted through `tracing` at the point it is
//! recorded, so a caller may either inspect the collection or read the log.
//! Routine entries (configured species exclusions) log at `debug`, the rest
//! at `warn`.

use serde::Serialize;

use crate::observation::{PlotId, Year};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Addition year with no decent year at or before it.
    AdditionDropped { year: Year },
    /// Mortality-check year with no decent year after it.
    MortalityDropped { year: Year },
    /// Every mortality year falls after the last decent year.
    MortalityDiscarded { years: Vec<Year> },
    /// Missing tree with no live diameter in the lookback window.
    MissingUnbridged { year: Year, species: String, plot: PlotId, tree_id: String },
    /// Zero plot area replaced by the default.
    PlotAreaCoerced { year: Year, plot: PlotId, area: f64 },
    /// Zero or absent stand area replaced by the default.
    StandAreaCoerced { year: Year, area: f64 },
    /// Row of an excluded species skipped by the standard pass.
    SpeciesExcluded { species: String, rows: usize },
    /// Tree-level evaluation with no equation for its species.
    NoEquation { species: String, tree_id: String },
}

impl Diagnostic {
    /// Expected outcome of the run's configuration rather than a data problem.
    pub fn is_routine(&self) -> bool {
        matches!(self, Diagnostic::SpeciesExcluded { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, stand: &str, diagnostic: Diagnostic) {
        if diagnostic.is_routine() {
            tracing::debug!(stand, ?diagnostic, "data diagnostic");
        } else {
            tracing::warn!(stand, ?diagnostic, "data diagnostic");
        }
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_species_exclusion_is_routine() {
        assert!(Diagnostic::SpeciesExcluded { species: "acci".into(), rows: 3 }.is_routine());
        assert!(!Diagnostic::StandAreaCoerced { year: 1990, area: 10_000.0 }.is_routine());
        assert!(!Diagnostic::NoEquation { species: "abam".into(), tree_id: "x".into() }.is_routine());
    }

    #[test]
    fn routine_entries_are_still_collected() {
        let mut diags = Diagnostics::default();
        diags.push("RS01", Diagnostic::SpeciesExcluded { species: "acci".into(), rows: 1 });
        assert_eq!(diags.len(), 1);
    }
}
