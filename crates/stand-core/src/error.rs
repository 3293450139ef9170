//! Fatal error taxonomy for the core.
//!
//! Only configuration and rendering problems surface as `Err`: data-quality
//! issues are recovered locally and recorded in
//! [`crate::diagnostics::Diagnostics`].

use thiserror::Error;

use crate::equations::SizeTier;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoreError {
    #[error("no equation defined for species {species} (tier {tier}, no normal-tier fallback)")]
    MissingEquation { species: String, tier: SizeTier },

    #[error("unknown equation form {form:?} for species {species}")]
    UnknownEquationForm { species: String, form: String },

    #[error("unknown size tier {tier:?} for species {species}")]
    UnknownSizeTier { species: String, tier: String },

    #[error("composite equation for species {species} has no components")]
    EmptyComposite { species: String },

    #[error("rendering report: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
