/// Problems turning a stored row back into a [`crate::FetchResult`].
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("missing column: {0}")]
    MissingColumn(&'static str),

    #[error("invalid value for {column}: {value:?} ({reason})")]
    InvalidValue {
        column: &'static str,
        value: String,
        reason: String,
    },

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}
