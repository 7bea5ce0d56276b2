use std::sync::Arc;

use headscan_common::FetchResult;
use tracing::{error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::error::{PipelineError, Result};
use crate::runner::BatchRunner;

/// A contiguous slice of the URL list, identified by its 1-based number.
/// Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub batch_number: u32,
    pub start: usize,
    pub end: usize,
}

impl BatchPlan {
    /// `ceil(total / size)`.
    pub fn count(total: usize, size: usize) -> u32 {
        if size == 0 {
            return 0;
        }
        total.div_ceil(size) as u32
    }

    /// Plan for batch `n`: `[(n-1)*size, min(n*size, total))`. `None` when
    /// `n` is out of range.
    pub fn for_batch(total: usize, size: usize, n: u32) -> Option<Self> {
        if n == 0 || n > Self::count(total, size) {
            return None;
        }
        let start = (n as usize - 1) * size;
        Some(Self {
            batch_number: n,
            start,
            end: (start + size).min(total),
        })
    }

    pub fn all(total: usize, size: usize) -> Vec<Self> {
        (1..=Self::count(total, size))
            .filter_map(|n| Self::for_batch(total, size, n))
            .collect()
    }

    pub fn slice<'a>(&self, urls: &'a [String]) -> &'a [String] {
        &urls[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Which batches a run processes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Every batch, overwriting existing artifacts.
    #[default]
    Full,
    /// Only batches with no artifact yet.
    Resume,
    /// Exactly these batch numbers, overwriting.
    Only(Vec<u32>),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub batches_planned: u32,
    pub batches_written: u32,
    pub batches_skipped: u32,
    pub urls_processed: u32,
    pub timeouts: u32,
    pub redirected: u32,
    pub meta_refresh: u32,
    pub empty_heads: u32,
}

impl RunStats {
    fn record(&mut self, results: &[FetchResult]) {
        self.batches_written += 1;
        for r in results {
            self.urls_processed += 1;
            if r.timeout_flag {
                self.timeouts += 1;
            }
            if r.is_redirected() {
                self.redirected += 1;
            }
            if r.has_meta_refresh {
                self.meta_refresh += 1;
            }
            if r.head_elements.is_none() {
                self.empty_heads += 1;
            }
        }
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Fetch Run Complete ===")?;
        writeln!(f, "Batches planned:  {}", self.batches_planned)?;
        writeln!(f, "Batches written:  {}", self.batches_written)?;
        writeln!(f, "Batches skipped:  {}", self.batches_skipped)?;
        writeln!(f, "URLs processed:   {}", self.urls_processed)?;
        writeln!(f, "Timeouts:         {}", self.timeouts)?;
        writeln!(f, "Redirected:       {}", self.redirected)?;
        writeln!(f, "Meta refresh:     {}", self.meta_refresh)?;
        write!(f, "Empty heads:      {}", self.empty_heads)
    }
}

/// Drives the runner over fixed-size batches, one batch at a time, and
/// checkpoints each before starting the next.
pub struct Sequencer {
    runner: BatchRunner,
    store: Arc<dyn CheckpointStore>,
    batch_size: usize,
}

impl Sequencer {
    pub fn new(runner: BatchRunner, store: Arc<dyn CheckpointStore>, batch_size: usize) -> Self {
        Self {
            runner,
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Process `urls` according to `mode`. The first checkpoint write
    /// failure aborts the run with [`PipelineError::Aborted`], carrying the
    /// stats for batches already written; URL-level failures never abort.
    pub async fn run(&self, urls: &[String], mode: &RunMode) -> Result<RunStats> {
        let total = urls.len();
        let planned = BatchPlan::count(total, self.batch_size);
        let mut stats = RunStats {
            batches_planned: planned,
            ..Default::default()
        };

        let plans = self.select(total, planned, mode)?;
        stats.batches_skipped = planned.saturating_sub(plans.len() as u32);
        info!(
            urls = total,
            batch_size = self.batch_size,
            planned,
            selected = plans.len(),
            mode = ?mode,
            "Starting fetch run"
        );

        for plan in plans {
            let batch_urls = plan.slice(urls);
            info!(batch = plan.batch_number, urls = batch_urls.len(), "Processing batch");

            let written = match self.runner.run(batch_urls, plan.start, total).await {
                Ok(results) => self.store.write(plan.batch_number, &results).map(|()| results),
                Err(e) => Err(e),
            };
            match written {
                Ok(results) => stats.record(&results),
                Err(e) => {
                    error!(batch = plan.batch_number, error = %e, "Fetch run aborted");
                    info!("{stats}");
                    return Err(PipelineError::Aborted {
                        stats,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!(
            written = stats.batches_written,
            skipped = stats.batches_skipped,
            timeouts = stats.timeouts,
            "Fetch run finished"
        );
        Ok(stats)
    }

    fn select(&self, total: usize, planned: u32, mode: &RunMode) -> Result<Vec<BatchPlan>> {
        let numbers: Vec<u32> = match mode {
            RunMode::Full => (1..=planned).collect(),
            RunMode::Resume => {
                if planned == 0 {
                    Vec::new()
                } else {
                    let missing = self.store.list_missing(1..=planned)?;
                    info!(missing = missing.len(), done = planned as usize - missing.len(), "Resuming");
                    missing
                }
            }
            RunMode::Only(requested) => {
                let mut numbers = requested.clone();
                numbers.sort_unstable();
                numbers.dedup();
                numbers
            }
        };

        Ok(numbers
            .into_iter()
            .filter_map(|n| {
                let plan = BatchPlan::for_batch(total, self.batch_size, n);
                if plan.is_none() {
                    warn!(batch = n, planned, "Batch number outside the plan, skipping");
                }
                plan
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_rounds_up() {
        assert_eq!(BatchPlan::count(0, 20), 0);
        assert_eq!(BatchPlan::count(3, 2), 2);
        assert_eq!(BatchPlan::count(40, 20), 2);
        assert_eq!(BatchPlan::count(41, 20), 3);
    }

    #[test]
    fn last_batch_is_short() {
        let plans = BatchPlan::all(5, 2);
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0], BatchPlan { batch_number: 1, start: 0, end: 2 });
        assert_eq!(plans[2], BatchPlan { batch_number: 3, start: 4, end: 5 });
        assert_eq!(plans[2].len(), 1);
    }

    #[test]
    fn out_of_range_batch_has_no_plan() {
        assert!(BatchPlan::for_batch(5, 2, 0).is_none());
        assert!(BatchPlan::for_batch(5, 2, 4).is_none());
    }

    #[test]
    fn plan_is_deterministic_per_number() {
        let urls: Vec<String> = (0..7).map(|i| format!("u{i}.com")).collect();
        let plan = BatchPlan::for_batch(urls.len(), 3, 2).unwrap();
        assert_eq!(plan.slice(&urls), &urls[3..6]);
    }
}
