// Merge reconciler.
//
// Joins batch artifacts onto the master table by `original_url`. The first
// batch that supplies results for a URL owns that URL's fetch columns; later
// batches supplying the same URL are dropped. Columns the master table had
// before any batch was joined are never overwritten.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::Path;

use chrono::Utc;
use headscan_common::{FetchResult, RESULT_COLUMNS};
use tracing::{info, warn};

use crate::checkpoint::{artifact_name, CheckpointStore};
use crate::error::{PipelineError, Result};
use crate::table::{Table, KEY_COLUMN};

/// What happened to one batch number during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Merged {
        batch: u32,
        file: String,
        rows: usize,
        matched: usize,
        duplicates: usize,
    },
    Failed {
        batch: u32,
        file: String,
        error: String,
    },
    Missing {
        batch: u32,
        file: String,
    },
    Excluded {
        batch: u32,
    },
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Merged {
                file,
                rows,
                matched,
                duplicates,
                ..
            } => {
                write!(f, "Merged: {file} ({rows} rows, {matched} matched")?;
                if *duplicates > 0 {
                    write!(f, ", {duplicates} already supplied")?;
                }
                write!(f, ")")
            }
            Provenance::Failed { file, error, .. } => write!(f, "Error in {file}: {error}"),
            Provenance::Missing { file, .. } => write!(f, "Missing: {file}"),
            Provenance::Excluded { batch } => write!(f, "Excluded: batch {batch}"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub merged: usize,
    pub missing: usize,
    pub errored: usize,
    pub excluded: usize,
    pub matched_rows: usize,
    pub master_rows: usize,
}

impl fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Merge Complete ===")?;
        writeln!(f, "Master rows:      {}", self.master_rows)?;
        writeln!(f, "Batches merged:   {}", self.merged)?;
        writeln!(f, "Batches missing:  {}", self.missing)?;
        writeln!(f, "Batches errored:  {}", self.errored)?;
        writeln!(f, "Batches excluded: {}", self.excluded)?;
        write!(f, "Rows matched:     {}", self.matched_rows)
    }
}

pub struct MergeOutcome {
    pub table: Table,
    pub log: Vec<Provenance>,
    pub summary: MergeSummary,
}

impl MergeOutcome {
    /// Write the merged table and the provenance log. The log is written
    /// even when the table write fails; the table error is returned after.
    pub fn persist(&self, output: &Path, log: &Path, null_token: &str) -> Result<()> {
        let written = self.table.write_csv(output, null_token);
        if let Err(e) = &written {
            warn!(path = %output.display(), error = %e, "Failed to write merged table");
        }
        self.write_log(log)?;
        written
    }

    /// Write the provenance log as plain text, one line per batch number.
    pub fn write_log(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "Merge run at {}", Utc::now().to_rfc3339())?;
        for entry in &self.log {
            writeln!(file, "{entry}")?;
        }
        writeln!(file, "{}", self.summary)?;
        Ok(())
    }
}

/// Read-only consumer of a checkpoint store.
pub struct Reconciler<'a> {
    store: &'a dyn CheckpointStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn CheckpointStore) -> Self {
        Self { store }
    }

    /// Join every batch in `batches` not in `excluded` onto `master`.
    ///
    /// Missing and unreadable artifacts are logged and skipped. The only
    /// error is a master table without an `original_url` column.
    pub fn reconcile(
        &self,
        master: Table,
        batches: RangeInclusive<u32>,
        excluded: &BTreeSet<u32>,
    ) -> Result<MergeOutcome> {
        let mut join = MasterJoin::new(master)?;
        let mut log = Vec::new();
        let mut summary = MergeSummary {
            master_rows: join.table.len(),
            ..Default::default()
        };

        for batch in batches {
            if excluded.contains(&batch) {
                summary.excluded += 1;
                log.push(Provenance::Excluded { batch });
                continue;
            }

            let file = artifact_name(batch);
            let entry = match self.store.read(batch) {
                Ok(results) => {
                    let (matched, duplicates) = join.apply(&results);
                    summary.merged += 1;
                    summary.matched_rows += matched;
                    info!(batch, rows = results.len(), matched, duplicates, "Merged batch");
                    Provenance::Merged {
                        batch,
                        file,
                        rows: results.len(),
                        matched,
                        duplicates,
                    }
                }
                Err(PipelineError::NotFound(_)) => {
                    summary.missing += 1;
                    warn!(batch, "Batch artifact missing");
                    Provenance::Missing { batch, file }
                }
                Err(e) => {
                    summary.errored += 1;
                    warn!(batch, error = %e, "Batch artifact unreadable");
                    Provenance::Failed {
                        batch,
                        file,
                        error: e.to_string(),
                    }
                }
            };
            log.push(entry);
        }

        Ok(MergeOutcome {
            table: join.table,
            log,
            summary,
        })
    }
}

/// Accumulating left join onto the master table.
struct MasterJoin {
    table: Table,
    rows_by_url: HashMap<String, Vec<usize>>,
    /// Columns present before any batch was joined.
    preexisting: HashSet<String>,
    supplied: HashSet<String>,
}

impl MasterJoin {
    fn new(table: Table) -> Result<Self> {
        let key = table
            .column(KEY_COLUMN)
            .ok_or_else(|| PipelineError::Table(format!("master table has no {KEY_COLUMN} column")))?;

        let mut rows_by_url: HashMap<String, Vec<usize>> = HashMap::new();
        for row in 0..table.len() {
            if let Some(url) = table.get(row, key) {
                rows_by_url.entry(url.trim().to_string()).or_default().push(row);
            }
        }
        let preexisting = table.columns().iter().cloned().collect();

        Ok(Self {
            table,
            rows_by_url,
            preexisting,
            supplied: HashSet::new(),
        })
    }

    /// Returns `(matched, duplicates)`: results whose URL is in the master
    /// table, and how many of those were dropped because an earlier batch
    /// already supplied the URL.
    fn apply(&mut self, results: &[FetchResult]) -> (usize, usize) {
        let targets: Vec<(usize, &str)> = RESULT_COLUMNS
            .iter()
            .enumerate()
            .filter(|(_, name)| **name != KEY_COLUMN && !self.preexisting.contains(**name))
            .map(|(idx, name)| (idx, *name))
            .collect();
        let columns: Vec<(usize, usize)> = targets
            .iter()
            .map(|(record_idx, name)| (*record_idx, self.table.ensure_column(name)))
            .collect();

        let mut matched = 0;
        let mut duplicates = 0;
        for result in results {
            let url = result.original_url.trim();
            let Some(rows) = self.rows_by_url.get(url) else {
                continue;
            };
            matched += 1;
            if !self.supplied.insert(url.to_string()) {
                duplicates += 1;
                continue;
            }

            let record = match result.to_record() {
                Ok(record) => record,
                Err(e) => {
                    warn!(url, error = %e, "Could not encode result, leaving row unmerged");
                    continue;
                }
            };
            for &row in rows {
                for &(record_idx, table_idx) in &columns {
                    self.table.set(row, table_idx, record[record_idx].clone());
                }
            }
        }
        (matched, duplicates)
    }
}

/// Concatenate every artifact in the store, in batch order. Unreadable
/// artifacts are skipped and returned alongside the table.
pub fn combine(store: &dyn CheckpointStore) -> Result<(Table, Vec<Provenance>)> {
    let mut results = Vec::new();
    let mut skipped = Vec::new();
    for batch in store.existing()? {
        match store.read(batch) {
            Ok(mut batch_results) => results.append(&mut batch_results),
            Err(e) => {
                warn!(batch, error = %e, "Skipping unreadable artifact");
                skipped.push(Provenance::Failed {
                    batch,
                    file: artifact_name(batch),
                    error: e.to_string(),
                });
            }
        }
    }
    Ok((Table::from_results(&results)?, skipped))
}
