//! Error taxonomy for scheme design

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DesignError>;

#[derive(Debug, Error)]
pub enum DesignError {
    /// A window or slice reaches past the end of its sequence.
    #[error("range {start}..{end} is outside sequence '{id}' of length {len}")]
    OutOfRange {
        id: String,
        start: usize,
        end: usize,
        len: usize,
    },

    /// Empty or malformed reference. The only error that aborts a run.
    #[error("invalid sequence '{id}': {reason}")]
    InvalidSequence { id: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown sequence '{0}'")]
    UnknownSequence(String),

    #[error("no primer found in '{id}' between {start} and {end}")]
    NoPrimerFound { id: String, start: usize, end: usize },

    #[error("no primer pair found for left primer ending at {left_end} in '{id}'")]
    NoPairFound { id: String, left_end: usize },

    #[error("amplicon insert of {len} bp outside {min}..={max}")]
    SizeOutOfRange { len: usize, min: usize, max: usize },

    #[error("heterodimer score {score} above {max}")]
    DimerRiskTooHigh { score: i32, max: i32 },

    #[error("primer pair forms {products} off-target product(s) in '{id}'")]
    OffTargetProduct { id: String, products: usize },

    #[error("no conflict-free pool for amplicon {amplicon} of '{id}'")]
    PoolAssignmentFailed { id: String, amplicon: usize },

    #[error("malformed BED line {line}: {reason}")]
    InvalidBed { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
