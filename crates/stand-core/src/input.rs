//! Exported input bundle: everything one run needs, already pulled from the
//! relational store.

use serde::{Deserialize, Serialize};

use crate::corrections::CorrectionTable;
use crate::equations::EquationRow;
use crate::observation::{DeadRow, LiveRow, TreeObservation, Year};
use crate::reference::ReferenceRows;

/// One stand's measurement rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StandInput {
    pub stand_id: String,
    /// Census years considered complete for this stand.
    pub decent_years: Vec<Year>,
    pub live: Vec<LiveRow>,
    pub dead: Vec<DeadRow>,
}

impl StandInput {
    pub fn live_observations(&self) -> Vec<TreeObservation> {
        self.live.iter().map(TreeObservation::from).collect()
    }

    pub fn dead_observations(&self) -> Vec<TreeObservation> {
        self.dead.iter().map(TreeObservation::from).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputBundle {
    pub stands: Vec<StandInput>,
    pub equations: Vec<EquationRow>,
    pub reference: ReferenceRows,
    pub corrections: CorrectionTable,
}

impl InputBundle {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn stand(&self, stand_id: &str) -> Option<&StandInput> {
        self.stands.iter().find(|s| s.stand_id == stand_id)
    }
}
