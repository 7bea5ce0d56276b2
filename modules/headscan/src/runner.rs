use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use headscan_common::FetchResult;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::extract::{extract_head, ExtractOptions};
use crate::gate::AdmissionGate;
use crate::renderer::PageRenderer;

/// Runs extraction units for a set of URLs, at most `capacity` at a time.
pub struct BatchRunner {
    renderer: Arc<dyn PageRenderer>,
    gate: AdmissionGate,
    options: ExtractOptions,
}

impl BatchRunner {
    /// Fails only when the admission gate cannot be built.
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        max_concurrency: usize,
        options: ExtractOptions,
    ) -> Result<Self> {
        let gate = AdmissionGate::new(max_concurrency)?;
        info!(
            max_concurrency = gate.capacity(),
            timeout_secs = options.timeout.as_secs(),
            grace_secs = options.grace.as_secs(),
            "Batch runner ready"
        );
        Ok(Self {
            renderer,
            gate,
            options,
        })
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// One result per input URL, in completion order. Each result carries
    /// its `original_url` for correlation.
    ///
    /// `start_index` and `total` place this slice within the whole run for
    /// progress lines. Individual URL failures never fail the batch; only a
    /// closed gate does.
    pub async fn run(
        &self,
        urls: &[String],
        start_index: usize,
        total: usize,
    ) -> Result<Vec<FetchResult>> {
        let renderer = self.renderer.as_ref();
        let gate = &self.gate;
        let options = &self.options;

        let mut in_flight: FuturesUnordered<_> = urls
            .iter()
            .enumerate()
            .map(|(offset, url)| async move {
                let _permit = gate.acquire().await?;
                Ok::<_, PipelineError>(
                    extract_head(renderer, url, start_index + offset, total, options).await,
                )
            })
            .collect();

        let mut results = Vec::with_capacity(urls.len());
        while let Some(outcome) = in_flight.next().await {
            results.push(outcome?);
        }
        Ok(results)
    }
}
