pub mod config;
pub mod error;
pub mod types;

pub use config::{FetchConfig, FileConfig, MergeConfig, Secrets};
pub use error::RecordError;
pub use types::{normalize_url, FetchResult, HeadElement, RedirectHop, RESULT_COLUMNS};
