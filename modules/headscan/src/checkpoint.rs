// Batch checkpoint store.
//
// One artifact per batch number, named `batch_<N>.csv`. Artifacts are
// replaced whole: a write lands in a temp file next to the target and is
// renamed over it, so readers see the old artifact or the new one.

use std::collections::BTreeSet;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use headscan_common::FetchResult;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::table::Table;

const ARTIFACT_PREFIX: &str = "batch_";
const ARTIFACT_SUFFIX: &str = ".csv";

/// File name for a batch number.
pub fn artifact_name(batch: u32) -> String {
    format!("{ARTIFACT_PREFIX}{batch}{ARTIFACT_SUFFIX}")
}

/// Batch number embedded in an artifact file name. `None` for anything that
/// does not follow the naming convention (`batch_abc.csv`, `notes.txt`, ...).
pub fn parse_artifact_name(name: &str) -> Option<u32> {
    name.strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_SUFFIX)?
        .parse()
        .ok()
}

pub trait CheckpointStore: Send + Sync {
    /// Persist a batch, replacing any earlier artifact for that number.
    fn write(&self, batch: u32, results: &[FetchResult]) -> Result<()>;

    fn exists(&self, batch: u32) -> bool;

    /// Every batch number that currently has an artifact.
    fn existing(&self) -> Result<BTreeSet<u32>>;

    /// `NotFound` when absent, `Corrupt` when present but unreadable.
    fn read(&self, batch: u32) -> Result<Vec<FetchResult>>;

    /// Batch numbers in `expected` with no artifact, ascending.
    fn list_missing(&self, expected: RangeInclusive<u32>) -> Result<Vec<u32>> {
        let existing = self.existing()?;
        Ok(expected.filter(|n| !existing.contains(n)).collect())
    }
}

/// Artifacts as CSV files in one directory.
pub struct DirCheckpointStore {
    dir: PathBuf,
    null_token: String,
}

impl DirCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, null_token: &str) -> Self {
        Self {
            dir: dir.into(),
            null_token: null_token.to_string(),
        }
    }

    pub fn path(&self, batch: u32) -> PathBuf {
        self.dir.join(artifact_name(batch))
    }

    fn write_atomic(&self, batch: u32, table: &Table) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        table
            .to_writer(tmp.as_file_mut(), &self.null_token)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path(batch)).map_err(|e| e.error)?;
        Ok(())
    }
}

impl CheckpointStore for DirCheckpointStore {
    fn write(&self, batch: u32, results: &[FetchResult]) -> Result<()> {
        let table = Table::from_results(results)?;
        self.write_atomic(batch, &table)
            .map_err(|source| PipelineError::Write { batch, source })?;
        info!(batch, rows = results.len(), path = %self.path(batch).display(), "Checkpoint written");
        Ok(())
    }

    fn exists(&self, batch: u32) -> bool {
        self.path(batch).is_file()
    }

    fn existing(&self) -> Result<BTreeSet<u32>> {
        if !self.dir.exists() {
            return Ok(BTreeSet::new());
        }
        let mut found = BTreeSet::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            match name.to_str().and_then(parse_artifact_name) {
                Some(n) => {
                    found.insert(n);
                }
                None => debug!(file = ?name, "Ignoring non-artifact file"),
            }
        }
        Ok(found)
    }

    fn read(&self, batch: u32) -> Result<Vec<FetchResult>> {
        let path = self.path(batch);
        if !path.is_file() {
            return Err(PipelineError::NotFound(batch));
        }
        let corrupt = |e: PipelineError| PipelineError::Corrupt {
            batch,
            message: e.to_string(),
        };
        Table::read_csv(&path, &self.null_token)
            .and_then(|table| table.to_results())
            .map_err(corrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(urls: &[&str]) -> Vec<FetchResult> {
        urls.iter().map(|u| FetchResult::new(*u)).collect()
    }

    #[test]
    fn parses_only_well_formed_names() {
        assert_eq!(parse_artifact_name("batch_12.csv"), Some(12));
        assert_eq!(parse_artifact_name("batch_abc.csv"), None);
        assert_eq!(parse_artifact_name("batch_3.csv.tmp"), None);
        assert_eq!(parse_artifact_name("other_3.csv"), None);
        assert_eq!(artifact_name(7), "batch_7.csv");
    }

    #[test]
    fn missing_dir_has_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirCheckpointStore::new(dir.path().join("nope"), "null");
        assert!(store.existing().unwrap().is_empty());
        assert_eq!(store.list_missing(1..=3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn list_missing_ignores_malformed_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirCheckpointStore::new(dir.path(), "null");
        store.write(1, &results(&["a.com"])).unwrap();
        std::fs::write(dir.path().join("batch_x.csv"), "junk").unwrap();
        std::fs::write(dir.path().join("README"), "junk").unwrap();

        assert_eq!(store.list_missing(1..=2).unwrap(), vec![2]);
    }

    #[test]
    fn read_absent_batch_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirCheckpointStore::new(dir.path(), "null");
        assert!(matches!(store.read(4), Err(PipelineError::NotFound(4))));
    }

    #[test]
    fn read_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirCheckpointStore::new(dir.path(), "null");
        std::fs::write(store.path(2), "final_url\nx\n").unwrap();
        assert!(matches!(store.read(2), Err(PipelineError::Corrupt { batch: 2, .. })));
    }

    #[test]
    fn rewrite_replaces_whole_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirCheckpointStore::new(dir.path(), "null");
        store.write(1, &results(&["a.com", "b.com"])).unwrap();
        store.write(1, &results(&["c.com"])).unwrap();

        let back = store.read(1).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].original_url, "c.com");
    }

    #[test]
    fn write_into_unwritable_location_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a dir").unwrap();
        let store = DirCheckpointStore::new(blocker.join("results"), "null");

        let err = store.write(1, &results(&["a.com"])).unwrap_err();
        assert!(matches!(err, PipelineError::Write { batch: 1, .. }));
    }
}
