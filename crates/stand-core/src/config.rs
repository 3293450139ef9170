use serde::{Deserialize, Serialize};

/// Per-m² → per-hectare multiplier applied at render time.
pub const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Tunable constants of one analysis run.
/// Defaults reproduce the published inventory figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Diameter (cm) at which a tree counts as "large". Inclusive.
    pub large_dbh: f64,
    /// Plot area (m²) used when no detail or unusual entry exists.
    pub default_plot_area: f64,
    /// Minimum measured diameter (cm) on a standard plot.
    pub default_min_dbh: f64,
    /// Minimum measured diameter (cm) on a detail plot lacking its own value.
    pub detail_min_dbh_floor: f64,
    /// Stand area (m²) used when the reference tables give none or zero.
    pub default_stand_area: f64,
    /// Number of preceding decent years searched when bridging a missing tree.
    pub missing_lookback: usize,
    /// Species kept out of the standard stand pass.
    pub excluded_species: Vec<String>,
    /// Study code written in the first report column.
    pub study_code: String,
    /// Entity code for stand-scale rows.
    pub stand_entity: String,
    /// Entity code for plot-scale rows.
    pub plot_entity: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            large_dbh: 15.0,
            default_plot_area: 625.0,
            default_min_dbh: 15.0,
            detail_min_dbh_floor: 5.0,
            default_stand_area: 10_000.0,
            missing_lookback: 4,
            excluded_species: vec!["acci".to_string()],
            study_code: "TP001".to_string(),
            stand_entity: "STAND".to_string(),
            plot_entity: "PLOT".to_string(),
        }
    }
}

impl AnalysisConfig {
    pub fn is_excluded(&self, species: &str) -> bool {
        self.excluded_species.iter().any(|s| s.eq_ignore_ascii_case(species))
    }
}
