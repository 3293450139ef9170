//! Population consistency check between consecutive decent years.
//!
//! Purely diagnostic:
//! - `Vanished`: live in decent year t, absent from every bucket in the next
//!   decent year (no death, no bridge).
//! - `Resurrected`: recorded dead in some year, live in a later year.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Unbounded};

use serde::Serialize;

use crate::observation::{PlotId, Year};
use crate::reconcile::ObservationIndex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PopulationIssue {
    Vanished { tree_id: String, species: String, plot: PlotId, last_seen: Year, expected: Year },
    Resurrected { tree_id: String, species: String, plot: PlotId, died: Year, seen_alive: Year },
}

#[derive(Default)]
struct Presence {
    species: String,
    plot: PlotId,
    live: BTreeSet<Year>,
    dead: BTreeSet<Year>,
}

/// Scan `index` across `decent_years` (sorted ascending).
pub fn check_population(index: &ObservationIndex, decent_years: &[Year]) -> Vec<PopulationIssue> {
    let mut trees: BTreeMap<&str, Presence> = BTreeMap::new();
    for (key, cell) in index.cells() {
        for (bucket, dead) in [(&cell.live, false), (&cell.ingrowth, false), (&cell.dead, true)] {
            for tree_id in bucket.keys() {
                let p = trees.entry(tree_id.as_str()).or_insert_with(|| Presence {
                    species: key.species.clone(),
                    plot: key.plot,
                    ..Default::default()
                });
                if dead {
                    p.dead.insert(key.year);
                } else {
                    p.live.insert(key.year);
                }
            }
        }
    }

    let mut issues = Vec::new();
    for (tree_id, p) in &trees {
        for pair in decent_years.windows(2) {
            let (t, next) = (pair[0], pair[1]);
            if p.live.contains(&t) && !p.live.contains(&next) && !p.dead.contains(&next) {
                // A death filed anywhere between the two censuses also explains it.
                let died_between = p.dead.range(t..=next).next().is_some();
                if !died_between {
                    issues.push(PopulationIssue::Vanished {
                        tree_id: tree_id.to_string(),
                        species: p.species.clone(),
                        plot: p.plot,
                        last_seen: t,
                        expected: next,
                    });
                }
            }
        }

        if let Some(&died) = p.dead.iter().next() {
            if let Some(&seen_alive) = p.live.range((Excluded(died), Unbounded)).next() {
                issues.push(PopulationIssue::Resurrected {
                    tree_id: tree_id.to_string(),
                    species: p.species.clone(),
                    plot: p.plot,
                    died,
                    seen_alive,
                });
            }
        }
    }

    tracing::debug!(trees = trees.len(), issues = issues.len(), "population check");
    issues
}
