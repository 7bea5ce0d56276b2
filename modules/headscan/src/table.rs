// CSV-backed tables with explicit absent cells.

use std::io::{Read, Write};
use std::path::Path;

use headscan_common::{FetchResult, RESULT_COLUMNS};

use crate::error::{PipelineError, Result};

/// Key column every input table and artifact carries.
pub const KEY_COLUMN: &str = "original_url";

/// Rectangular table of optional string cells. `None` is an absent value,
/// written out as the configured null token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Artifact-shaped table from fetch results.
    pub fn from_results(results: &[FetchResult]) -> Result<Self> {
        let mut table = Self::new(RESULT_COLUMNS.iter().map(|c| c.to_string()).collect());
        for result in results {
            table.rows.push(result.to_record()?);
        }
        Ok(table)
    }

    pub fn read_csv(path: &Path, null_token: &str) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, null_token)
    }

    /// Empty cells and cells equal to `null_token` read as absent.
    pub fn from_reader<R: Read>(reader: R, null_token: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let columns: Vec<String> = reader.headers()?.iter().map(String::from).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|cell| {
                        if cell.is_empty() || cell == null_token {
                            None
                        } else {
                            Some(cell.to_string())
                        }
                    })
                    .collect(),
            );
        }
        Ok(Self { columns, rows })
    }

    pub fn write_csv(&self, path: &Path, null_token: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        self.to_writer(file, null_token)
    }

    pub fn to_writer<W: Write>(&self, writer: W, null_token: &str) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or(null_token)))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of `name`, appending it (absent in every row) if needed.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    pub fn push_row(&mut self, row: Vec<Option<String>>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::Table(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    pub fn set(&mut self, row: usize, column: usize, value: Option<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }

    /// Value of `name` in a given row, by column name.
    pub fn value(&self, row: usize, name: &str) -> Option<&str> {
        self.get(row, self.column(name)?)
    }

    /// Non-absent values of `name`, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<String>> {
        let idx = self
            .column(name)
            .ok_or_else(|| PipelineError::Table(format!("missing column: {name}")))?;
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.get(idx).cloned().flatten())
            .collect())
    }

    /// Rebuild fetch results from an artifact-shaped table.
    pub fn to_results(&self) -> Result<Vec<FetchResult>> {
        self.rows
            .iter()
            .map(|row| Ok(FetchResult::from_record(&self.columns, row)?))
            .collect()
    }
}

/// URLs to fetch from an input table: the non-empty `original_url` cells.
pub fn load_urls(path: &Path, null_token: &str) -> Result<Vec<String>> {
    let table = Table::read_csv(path, null_token)?;
    Ok(table
        .column_values(KEY_COLUMN)?
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect())
}
