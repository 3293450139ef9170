//! Allometric equation shapes and their evaluation.
//!
//! Units: diameter in cm, height in m, biomass in Mg, volume in m³,
//! wood density in Mg/m³.
//!
//! Height-based forms estimate height from diameter first:
//!   ht = 1.37 + h1 · (1 − e^(h2·d))^h3
//!
//! Jenkins biomass is independent of the form:
//!   jenkins = 0.001 · e^(j1 + j2·ln d)
//!
//! A composite sums biomass and volume over its components but evaluates
//! Jenkins once, from its own coefficients.

use serde::{Deserialize, Serialize};

/// Rounding applied to biomass and volume.
const BIOMASS_PLACES: i32 = 4;
/// Rounding applied to Jenkins biomass.
const JENKINS_PLACES: i32 = 5;

/// Breast height (m); the height curve's intercept.
const BREAST_HEIGHT_M: f64 = 1.37;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coefficients {
    pub b1: f64,
    pub b2: f64,
    pub b3: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeightCurve {
    pub h1: f64,
    pub h2: f64,
    pub h3: f64,
}

impl HeightCurve {
    pub fn height(&self, dbh: f64) -> f64 {
        BREAST_HEIGHT_M + self.h1 * (1.0 - (self.h2 * dbh).exp()).powf(self.h3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JenkinsCoefficients {
    pub j1: f64,
    pub j2: f64,
}

impl JenkinsCoefficients {
    /// Unrounded Jenkins biomass (Mg). Zero when no coefficients are given.
    fn biomass(&self, dbh: f64) -> f64 {
        if self.j1 == 0.0 && self.j2 == 0.0 {
            return 0.0;
        }
        0.001 * (self.j1 + self.j2 * dbh.ln()).exp()
    }
}

/// One closed equation shape with its coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum EquationForm {
    /// bio = 0.001·e^(b1 + b2·ln d)
    Lnln { b: Coefficients },
    /// bio = 0.001·b3·e^(b1 + b2·ln d); b3 is a log-bias correction (0 → 1).
    LnlnLegacy { b: Coefficients },
    /// bio = 0.001·e^(b1 + b2·ln d + b3·d)
    Biopak { b: Coefficients },
    /// bio = 0.001·b1·d^b2
    Power { b: Coefficients },
    /// vol = b1·d^b2·ht^b3
    D2ht { b: Coefficients, h: HeightCurve },
    /// vol = e^(b1 + b2·ln d + b3·ln ht)
    D2htCascade { b: Coefficients, h: HeightCurve },
    /// bio = 0.001·b1·(d²·ht)^b2
    Oak { b: Coefficients, h: HeightCurve },
    /// Sum of component equations (e.g. bark + wood).
    Composite { components: Vec<Equation> },
}

impl EquationForm {
    pub fn tag(&self) -> &'static str {
        match self {
            EquationForm::Lnln { .. } => "lnln",
            EquationForm::LnlnLegacy { .. } => "lnln_legacy",
            EquationForm::Biopak { .. } => "biopak",
            EquationForm::Power { .. } => "power",
            EquationForm::D2ht { .. } => "d2ht",
            EquationForm::D2htCascade { .. } => "d2ht_cascade",
            EquationForm::Oak { .. } => "oak",
            EquationForm::Composite { .. } => "composite",
        }
    }

    /// Build a simple (non-composite) form from its tag.
    pub fn from_tag(tag: &str, b: Coefficients, h: HeightCurve) -> Option<Self> {
        let form = match tag.trim().to_ascii_lowercase().as_str() {
            "lnln" => EquationForm::Lnln { b },
            "lnln_legacy" => EquationForm::LnlnLegacy { b },
            "biopak" => EquationForm::Biopak { b },
            "power" => EquationForm::Power { b },
            "d2ht" => EquationForm::D2ht { b, h },
            "d2ht_cascade" => EquationForm::D2htCascade { b, h },
            "oak" => EquationForm::Oak { b, h },
            _ => return None,
        };
        Some(form)
    }
}

/// Per-tree output of an equation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TreeMetrics {
    pub biomass: f64,
    pub volume: f64,
    pub jenkins: f64,
    pub wood_density: f64,
}

impl TreeMetrics {
    fn is_valid(&self) -> bool {
        [self.biomass, self.volume, self.jenkins]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// A species' equation: shape, wood density and Jenkins coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    #[serde(flatten)]
    pub form: EquationForm,
    pub wood_density: f64,
    #[serde(default)]
    pub jenkins: JenkinsCoefficients,
}

impl Equation {
    /// Evaluate at `dbh` (cm).
    ///
    /// Never fails: a non-positive or non-finite diameter, or any domain
    /// error inside the formula, yields all zeros.
    pub fn evaluate(&self, dbh: f64) -> TreeMetrics {
        if !dbh.is_finite() || dbh <= 0.0 {
            return TreeMetrics::default();
        }

        let metrics = match &self.form {
            EquationForm::Composite { components } => {
                let mut sum = TreeMetrics { wood_density: self.wood_density, ..Default::default() };
                for part in components {
                    let m = part.evaluate(dbh);
                    sum.biomass += m.biomass;
                    sum.volume += m.volume;
                }
                TreeMetrics {
                    biomass: round_to(sum.biomass, BIOMASS_PLACES),
                    volume: round_to(sum.volume, BIOMASS_PLACES),
                    jenkins: round_to(self.jenkins.biomass(dbh), JENKINS_PLACES),
                    wood_density: self.wood_density,
                }
            }
            form => {
                let (biomass, volume) = self.biomass_and_volume(form, dbh);
                TreeMetrics {
                    biomass: round_to(biomass, BIOMASS_PLACES),
                    volume: round_to(volume, BIOMASS_PLACES),
                    jenkins: round_to(self.jenkins.biomass(dbh), JENKINS_PLACES),
                    wood_density: self.wood_density,
                }
            }
        };

        if metrics.is_valid() {
            metrics
        } else {
            TreeMetrics::default()
        }
    }

    fn biomass_and_volume(&self, form: &EquationForm, d: f64) -> (f64, f64) {
        let wd = self.wood_density;
        let from_biomass = |bio: f64| (bio, if wd > 0.0 { bio / wd } else { 0.0 });
        let from_volume = |vol: f64| (vol * wd, vol);

        match form {
            EquationForm::Lnln { b } => from_biomass(0.001 * (b.b1 + b.b2 * d.ln()).exp()),
            EquationForm::LnlnLegacy { b } => {
                let correction = if b.b3 == 0.0 { 1.0 } else { b.b3 };
                from_biomass(0.001 * correction * (b.b1 + b.b2 * d.ln()).exp())
            }
            EquationForm::Biopak { b } => {
                from_biomass(0.001 * (b.b1 + b.b2 * d.ln() + b.b3 * d).exp())
            }
            EquationForm::Power { b } => from_biomass(0.001 * b.b1 * d.powf(b.b2)),
            EquationForm::D2ht { b, h } => {
                let ht = h.height(d);
                from_volume(b.b1 * d.powf(b.b2) * ht.powf(b.b3))
            }
            EquationForm::D2htCascade { b, h } => {
                let ht = h.height(d);
                from_volume((b.b1 + b.b2 * d.ln() + b.b3 * ht.ln()).exp())
            }
            EquationForm::Oak { b, h } => {
                let ht = h.height(d);
                from_biomass(0.001 * b.b1 * (d * d * ht).powf(b.b2))
            }
            EquationForm::Composite { .. } => (0.0, 0.0),
        }
    }
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
