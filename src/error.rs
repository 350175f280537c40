//! Error taxonomy for the analysis pipeline

use std::path::PathBuf;

use thiserror::Error;

use crate::data::{Feature, RecordId};

/// Reasons a batch cannot be standardized or projected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Degeneracy {
    #[error("empty batch")]
    EmptyBatch,
    #[error("{0} record(s) is too few to estimate variance")]
    TooFewRecords(usize),
    #[error("feature `{0}` has zero variance")]
    ZeroVariance(Feature),
    #[error("{0} feature(s) selected, at least 2 are needed for a 2D projection")]
    TooFewFeatures(usize),
}

/// Errors surfaced by the library
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to retrieve dataset from {url}: {reason}")]
    DataRetrieval { url: String, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("required column `{0}` not found in dataset")]
    MissingColumn(String),

    #[error("dataset error: {0}")]
    Dataset(#[from] polars::error::PolarsError),

    #[error("degenerate input: {0}")]
    DegenerateInput(Degeneracy),

    #[error("numeric instability: {0}")]
    NumericInstability(String),

    #[error("cannot form {k} clusters from {distinct} distinct point(s)")]
    TooFewDistinctPoints { k: usize, distinct: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("record {0} has no cluster assignment")]
    MissingAssignment(RecordId),

    #[error("archetype `{0}` has no members")]
    EmptyArchetype(String),

    #[error("report serialization failed: {0}")]
    Report(#[from] serde_json::Error),
}

impl AnalysisError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<Degeneracy> for AnalysisError {
    fn from(value: Degeneracy) -> Self {
        AnalysisError::DegenerateInput(value)
    }
}
