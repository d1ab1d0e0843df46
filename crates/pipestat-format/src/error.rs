//! Error type for reading and writing tables.

use pipestat_core::AnalysisError;

/// Errors that can occur while decoding input tables or encoding results.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The underlying CSV reader or writer failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required key column is absent from the header row.
    #[error("missing required column {0:?}")]
    MissingColumn(String),

    /// The header row has key columns but no metric columns.
    #[error("input has no metric columns besides the key columns")]
    NoMetrics,

    /// A key cell is empty.
    #[error("row {row}: empty {column:?} cell")]
    EmptyKey {
        /// 1-based line number in the input.
        row: u64,
        /// Key column name.
        column: String,
    },

    /// The same (image, pipeline) pair appears on two rows.
    #[error("row {row}: duplicate row for image {image:?}, pipeline {pipeline:?}")]
    DuplicateRow {
        /// 1-based line number of the second occurrence.
        row: u64,
        /// Image identifier.
        image: String,
        /// Pipeline identifier.
        pipeline: String,
    },

    /// A metric cell is neither empty, `nan`, nor a finite number.
    #[error("row {row}, column {column:?}: {value:?} is not a finite number")]
    InvalidNumber {
        /// 1-based line number in the input.
        row: u64,
        /// Metric column name.
        column: String,
        /// Offending cell text.
        value: String,
    },

    /// The parsed observations were rejected by the analysis core.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Encoded output could not be finalised.
    #[error("failed to finish output: {0}")]
    Output(String),
}

impl FormatError {
    /// Whether the error describes structurally invalid input, which
    /// aborts a run before any analysis.
    #[must_use]
    pub const fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn(_)
                | Self::NoMetrics
                | Self::EmptyKey { .. }
                | Self::DuplicateRow { .. }
                | Self::InvalidNumber { .. }
                | Self::Analysis(AnalysisError::MalformedInput(_))
        )
    }
}
