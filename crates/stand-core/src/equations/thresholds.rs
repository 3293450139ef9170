//! Fixed per-species diameter thresholds for big-tier equation selection.

use serde::{Deserialize, Serialize};

/// Equation size tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeTier {
    Normal,
    Big,
}

impl std::fmt::Display for SizeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizeTier::Normal => f.write_str("normal"),
            SizeTier::Big => f.write_str("big"),
        }
    }
}

impl std::str::FromStr for SizeTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "" => Ok(SizeTier::Normal),
            "big" => Ok(SizeTier::Big),
            _ => Err(()),
        }
    }
}

/// (species, threshold dbh in cm). Sorted by species code.
const MAX_REF: &[(&str, f64)] = &[
    ("abam", 71.6),
    ("abco", 95.0),
    ("abgr", 76.2),
    ("abla", 50.8),
    ("abpr", 88.9),
    ("acma", 60.0),
    ("alru", 45.7),
    ("cach", 40.0),
    ("pico", 43.2),
    ("pien", 58.4),
    ("pila", 101.6),
    ("pimo", 68.6),
    ("pipo", 96.5),
    ("pisi", 116.8),
    ("psme", 162.6),
    ("quga", 50.8),
    ("tabr", 30.5),
    ("thpl", 147.3),
    ("tshe", 94.0),
    ("tsme", 76.2),
];

/// Threshold diameter for `species`, if it has a two-tier form.
pub fn threshold(species: &str) -> Option<f64> {
    let key = species.to_ascii_lowercase();
    MAX_REF
        .binary_search_by(|(s, _)| s.cmp(&key.as_str()))
        .ok()
        .map(|i| MAX_REF[i].1)
}

/// `Big` iff `dbh ≥ threshold(species)`; `Normal` for null diameter or an
/// unknown species.
pub fn max_ref(dbh: Option<f64>, species: &str) -> SizeTier {
    match (dbh, threshold(species)) {
        (Some(d), Some(t)) if d.is_finite() && d >= t => SizeTier::Big,
        _ => SizeTier::Normal,
    }
}
