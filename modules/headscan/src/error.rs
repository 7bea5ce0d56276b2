use headscan_common::RecordError;

use crate::sequencer::RunStats;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Admission gate unavailable: {0}")]
    Gate(String),

    #[error("Failed to write batch {batch}: {source}")]
    Write {
        batch: u32,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Fetch run aborted after writing {} of {} batches: {source}",
        .stats.batches_written,
        .stats.batches_planned
    )]
    Aborted {
        stats: RunStats,
        source: Box<PipelineError>,
    },

    #[error("No artifact for batch {0}")]
    NotFound(u32),

    #[error("Corrupt artifact for batch {batch}: {message}")]
    Corrupt { batch: u32, message: String },

    #[error("Table error: {0}")]
    Table(String),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Table(err.to_string())
    }
}
