//! Allometric equation registry.
//!
//! Coefficient rows from the data-access layer are parsed once into a closed
//! [`EquationForm`] per (species, tier). Lookups select the tier with
//! [`max_ref`] and fall back to the normal tier; a species with neither is a
//! configuration error.

pub mod forms;
pub mod thresholds;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
pub use forms::{round_to, Coefficients, Equation, EquationForm, HeightCurve, JenkinsCoefficients, TreeMetrics};
pub use thresholds::{max_ref, threshold, SizeTier};

/// One coefficient row as stored in the equation table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EquationRow {
    pub species: String,
    /// "normal" or "big"; empty means normal.
    pub size: String,
    /// Form tag, e.g. "lnln" or "d2ht".
    pub form: String,
    pub wood_density: f64,
    pub b1: f64,
    pub b2: f64,
    pub b3: f64,
    pub h1: f64,
    pub h2: f64,
    pub h3: f64,
    pub j1: f64,
    pub j2: f64,
    /// Component label for rows that sum into one composite equation.
    pub component: Option<String>,
}

impl EquationRow {
    fn to_equation(&self) -> Result<Equation> {
        let b = Coefficients { b1: self.b1, b2: self.b2, b3: self.b3 };
        let h = HeightCurve { h1: self.h1, h2: self.h2, h3: self.h3 };
        let form = EquationForm::from_tag(&self.form, b, h).ok_or_else(|| {
            CoreError::UnknownEquationForm { species: self.species.clone(), form: self.form.clone() }
        })?;
        Ok(Equation {
            form,
            wood_density: self.wood_density,
            jenkins: JenkinsCoefficients { j1: self.j1, j2: self.j2 },
        })
    }

    fn tier(&self) -> Result<SizeTier> {
        self.size.parse().map_err(|_| CoreError::UnknownSizeTier {
            species: self.species.clone(),
            tier: self.size.clone(),
        })
    }
}

/// Immutable (species, tier) → equation map.
#[derive(Debug, Clone, Default)]
pub struct EquationTable {
    equations: HashMap<(String, SizeTier), Equation>,
}

impl EquationTable {
    /// Parse coefficient rows. Rows carrying a `component` label are grouped
    /// per (species, tier) into one composite equation, in row order. The
    /// composite takes wood density and Jenkins coefficients from its first
    /// component.
    pub fn from_rows(rows: &[EquationRow]) -> Result<Self> {
        let mut equations = HashMap::new();
        let mut composites: BTreeMap<(String, SizeTier), Vec<Equation>> = BTreeMap::new();

        for row in rows {
            let key = (row.species.to_lowercase(), row.tier()?);
            let eq = row.to_equation()?;
            if row.component.is_some() {
                composites.entry(key).or_default().push(eq);
            } else {
                equations.insert(key, eq);
            }
        }

        for (key, components) in composites {
            let Some(first) = components.first() else {
                return Err(CoreError::EmptyComposite { species: key.0 });
            };
            let (wood_density, jenkins) = (first.wood_density, first.jenkins);
            equations.insert(
                key,
                Equation {
                    form: EquationForm::Composite { components },
                    wood_density,
                    jenkins,
                },
            );
        }

        Ok(Self { equations })
    }

    pub fn insert(&mut self, species: &str, tier: SizeTier, equation: Equation) {
        self.equations.insert((species.to_lowercase(), tier), equation);
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    /// Equation for `tier`, falling back to the normal tier.
    pub fn lookup(&self, species: &str, tier: SizeTier) -> Result<&Equation> {
        let species = species.to_lowercase();
        self.equations
            .get(&(species.clone(), tier))
            .or_else(|| self.equations.get(&(species.clone(), SizeTier::Normal)))
            .ok_or(CoreError::MissingEquation { species, tier })
    }

    /// Equation for a large tree: tier chosen by [`max_ref`].
    pub fn for_large(&self, species: &str, dbh: f64) -> Result<&Equation> {
        self.lookup(species, max_ref(Some(dbh), species))
    }

    /// Equation for a small tree: always the normal tier.
    pub fn for_small(&self, species: &str) -> Result<&Equation> {
        self.lookup(species, SizeTier::Normal)
    }
}
