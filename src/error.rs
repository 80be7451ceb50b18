//! Error taxonomy for the assignment engine.

use thiserror::Error;

use crate::models::AdminLevel;

/// Fatal errors raised while dissolving levels or running the tile scan.
///
/// Recoverable conditions (empty fine-level geometries, tiles already emitted
/// by an earlier polygon) are not errors; they are counted in
/// [`crate::assign::AssignStats`].
#[derive(Debug, Error)]
pub enum AssignError {
    /// A required level has no relation polygons after filtering.
    #[error("admin level {tag} ({level}) is missing or has no relation polygons")]
    MissingLevel { level: AdminLevel, tag: u8 },

    /// A feature selected for a level carries no numeric OSM id.
    #[error("feature at admin level {tag} ({level}) has no numeric OSM id; export with `-a id,type`")]
    MissingIdentifier { level: AdminLevel, tag: u8 },

    /// Fine-level area covers too little of the baseline level.
    #[error(
        "fine level covers {ratio:.4} of baseline level {baseline_tag}, below the minimum {min_ratio:.4}"
    )]
    Coverage {
        baseline_tag: u8,
        ratio: f64,
        min_ratio: f64,
    },

    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was stopped through its cancel token.
    #[error("tile assignment cancelled")]
    Cancelled,

    /// The record sink failed to accept a batch.
    #[error("record sink failed")]
    Sink(#[source] anyhow::Error),
}
