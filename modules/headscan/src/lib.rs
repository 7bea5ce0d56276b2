pub mod checkpoint;
pub mod error;
pub mod extract;
pub mod gate;
pub mod merge;
pub mod notifier;
pub mod renderer;
pub mod runner;
pub mod sequencer;
pub mod table;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use checkpoint::{artifact_name, parse_artifact_name, CheckpointStore, DirCheckpointStore};
pub use error::{PipelineError, Result};
pub use extract::{extract_head, ExtractOptions, DEFAULT_UNIT_GRACE};
pub use gate::{AdmissionGate, GatePermit};
pub use merge::{combine, MergeOutcome, MergeSummary, Provenance, Reconciler};
pub use notifier::{LogNotifier, Notifier, SlackNotifier};
pub use renderer::{BrowserlessRenderer, PageRenderer, PageSession, RenderError, WaitUntil};
pub use runner::BatchRunner;
pub use sequencer::{BatchPlan, RunMode, RunStats, Sequencer};
pub use table::{load_urls, Table};

pub use headscan_common::{FetchResult, HeadElement, RedirectHop};
