use std::time::Duration;

use thiserror::Error as ThisError;

/// Why a single symbol produced no indicator rows.
///
/// The batch driver records every variant as a failed attempt and moves on;
/// none of them aborts the run.
#[derive(ThisError, Debug)]
pub enum SymbolError {
    #[error("no price data")]
    NoPriceData,

    #[error("missing field file: {0}")]
    MissingField(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl SymbolError {
    /// True when the symbol simply has nothing to compute, as opposed to a
    /// failure that may succeed on retry.
    pub fn is_empty_data(&self) -> bool {
        matches!(self, SymbolError::NoPriceData)
    }
}
