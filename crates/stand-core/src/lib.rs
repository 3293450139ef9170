//! Forest-stand temporal reconciliation and per-hectare biomass aggregation.
//!
//! Stages, leaves first: allometric equations, reference resolution,
//! temporal reconciliation, aggregation, report rendering. The crate does no
//! I/O; front ends hand it an [`input::InputBundle`].

pub mod aggregate;
pub mod config;
pub mod consistency;
pub mod corrections;
pub mod diagnostics;
mod entries;
pub mod equations;
pub mod error;
pub mod input;
pub mod observation;
pub mod pipeline;
pub mod reconcile;
pub mod reference;
pub mod report;
pub mod tree;

pub use config::AnalysisConfig;
pub use error::{CoreError, Result};
pub use input::{InputBundle, StandInput};
pub use pipeline::{StandAnalysis, StandAnalyzer};
