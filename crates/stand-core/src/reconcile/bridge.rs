//! Missing-tree bridge.
//!
//! A tree reported missing gets the diameter of its most recent live
//! measurement on the same (species, plot), searched over at most `lookback`
//! decent years before the missing year, nearest first. Trees with no such
//! measurement are dropped with a diagnostic.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::observation::{Category, TreeObservation, TreeStatus, Year, BRIDGED_DBH_CODE};

use super::ObservationIndex;

/// Bridge every staged observation into the `live` bucket of its year.
/// Returns the number of trees bridged.
///
/// Observations are processed in ascending year order so a tree missing in
/// consecutive censuses bridges from its already-bridged diameter.
pub fn bridge_missing(
    stand: &str,
    index: &mut ObservationIndex,
    mut pending: Vec<TreeObservation>,
    decent_years: &[Year],
    lookback: usize,
    diags: &mut Diagnostics,
) -> usize {
    pending.sort_by(|a, b| {
        (a.year, &a.species, a.plot, &a.tree_id).cmp(&(b.year, &b.species, b.plot, &b.tree_id))
    });

    let mut bridged = 0;
    for obs in pending {
        let earlier = decent_years.partition_point(|&y| y < obs.year);
        let found = decent_years[..earlier]
            .iter()
            .rev()
            .take(lookback)
            .find_map(|&y| index.live_dbh(y, &obs.species, obs.plot, &obs.tree_id));

        match found {
            Some(dbh) => {
                let synthetic = TreeObservation {
                    dbh: Some(dbh),
                    status: TreeStatus::Bridged,
                    dbh_code: Some(BRIDGED_DBH_CODE.to_string()),
                    ..obs
                };
                index.insert(Category::Live, &synthetic);
                bridged += 1;
            }
            None => diags.push(
                stand,
                Diagnostic::MissingUnbridged {
                    year: obs.year,
                    species: obs.species,
                    plot: obs.plot,
                    tree_id: obs.tree_id,
                },
            ),
        }
    }
    bridged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::PlotId;

    fn obs(tree: &str, plot: PlotId, year: Year, dbh: Option<f64>, status: TreeStatus) -> TreeObservation {
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

    fn index_with(live: &[TreeObservation]) -> ObservationIndex {
        let mut index = ObservationIndex::default();
        for o in live {
            index.insert(Category::Live, o);
        }
        index
    }

    #[test]
    fn missing_tree_takes_previous_live_diameter() {
        let mut index = index_with(&[obs("t1", 1, 1985, Some(42.3), TreeStatus::Ok)]);
        let mut diags = Diagnostics::default();
        let n = bridge_missing(
            "RS01",
            &mut index,
            vec![obs("t1", 1, 1990, None, TreeStatus::Missing)],
            &[1985, 1990, 1995],
            4,
            &mut diags,
        );
        assert_eq!(n, 1);
        let m = &index.cell(1990, "psme", 1).unwrap().live["t1"];
        assert_eq!(m.dbh, Some(42.3));
        assert_eq!(m.status, TreeStatus::Bridged);
        assert!(diags.is_empty());
    }

    #[test]
    fn search_stops_after_lookback_years() {
        // Live in 1970; missing in 1995; four decent years lie in between.
        let mut index = index_with(&[obs("t1", 1, 1970, Some(30.0), TreeStatus::Ok)]);
        let mut diags = Diagnostics::default();
        let n = bridge_missing(
            "RS01",
            &mut index,
            vec![obs("t1", 1, 1995, None, TreeStatus::Missing)],
            &[1970, 1975, 1980, 1985, 1990, 1995],
            4,
            &mut diags,
        );
        assert_eq!(n, 0);
        assert!(index.cell(1995, "psme", 1).is_none());
        assert_eq!(
            diags.entries,
            vec![Diagnostic::MissingUnbridged {
                year: 1995,
                species: "psme".into(),
                plot: 1,
                tree_id: "t1".into()
            }]
        );
    }

    #[test]
    fn fourth_preceding_year_is_still_searched() {
        let mut index = index_with(&[obs("t1", 1, 1975, Some(30.0), TreeStatus::Ok)]);
        let mut diags = Diagnostics::default();
        let n = bridge_missing(
            "RS01",
            &mut index,
            vec![obs("t1", 1, 1995, None, TreeStatus::Missing)],
            &[1970, 1975, 1980, 1985, 1990, 1995],
            4,
            &mut diags,
        );
        assert_eq!(n, 1);
    }

    #[test]
    fn consecutive_missing_years_chain() {
        let mut index = index_with(&[obs("t1", 1, 1985, Some(25.0), TreeStatus::Ok)]);
        let mut diags = Diagnostics::default();
        let n = bridge_missing(
            "RS01",
            &mut index,
            vec![
                obs("t1", 1, 1995, None, TreeStatus::Missing),
                obs("t1", 1, 1990, None, TreeStatus::Missing),
            ],
            &[1985, 1990, 1995],
            1,
            &mut diags,
        );
        assert_eq!(n, 2);
        assert_eq!(index.live_dbh(1995, "psme", 1, "t1"), Some(25.0));
    }

    #[test]
    fn other_plot_does_not_match() {
        let mut index = index_with(&[obs("t1", 2, 1985, Some(25.0), TreeStatus::Ok)]);
        let mut diags = Diagnostics::default();
        let n = bridge_missing(
            "RS01",
            &mut index,
            vec![obs("t1", 1, 1990, None, TreeStatus::Missing)],
            &[1985, 1990],
            4,
            &mut diags,
        );
        assert_eq!(n, 0);
        assert_eq!(diags.len(), 1);
    }
}
