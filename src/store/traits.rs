//! `SheetBackend` trait: whole-table read/write over a spreadsheet-like store.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// A flat table: one header row plus string rows.
///
/// Rows are always as wide as the header; short rows coming back from a
/// remote sheet (which trims trailing empty cells) are padded on load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(header: impl IntoIterator<Item = S>) -> Self {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table from raw sheet values where the first row is the header.
    pub fn from_values(mut values: Vec<Vec<String>>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let header = values.remove(0);
        let mut table = Self {
            header,
            rows: values,
        };
        table.normalize();
        table
    }

    /// Header row followed by data rows, as written to a sheet.
    pub fn to_values(&self) -> Vec<Vec<String>> {
        let mut values = Vec::with_capacity(self.rows.len() + 1);
        values.push(self.header.clone());
        values.extend(self.rows.iter().cloned());
        values
    }

    /// A table that has never been written has no header.
    pub fn is_uninitialized(&self) -> bool {
        self.header.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.trim() == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Cell value by row index and column name; empty when either is missing.
    pub fn cell(&self, row: usize, name: &str) -> &str {
        match (self.rows.get(row), self.column(name)) {
            (Some(cells), Some(col)) => cells.get(col).map(String::as_str).unwrap_or(""),
            _ => "",
        }
    }

    /// Set a cell, adding the column first if the header lacks it.
    pub fn set_cell(&mut self, row: usize, name: &str, value: impl Into<String>) {
        let col = self.ensure_column(name, "");
        if let Some(cells) = self.rows.get_mut(row) {
            cells[col] = value.into();
        }
    }

    /// Add a column filled with `default` unless it already exists.
    /// Returns the column index.
    pub fn ensure_column(&mut self, name: &str, default: &str) -> usize {
        if let Some(col) = self.column(name) {
            return col;
        }
        self.header.push(name.to_string());
        for row in &mut self.rows {
            row.push(default.to_string());
        }
        self.header.len() - 1
    }

    /// Append a row given as (column, value) pairs. Unknown columns are added.
    pub fn push_record(&mut self, record: &[(&str, String)]) {
        for (name, _) in record {
            self.ensure_column(name, "");
        }
        let mut row = vec![String::new(); self.header.len()];
        for (name, value) in record {
            if let Some(col) = self.column(name) {
                row[col] = value.clone();
            }
        }
        self.rows.push(row);
    }

    /// Remove a row, returning it.
    pub fn remove_row(&mut self, row: usize) -> Option<Vec<String>> {
        (row < self.rows.len()).then(|| self.rows.remove(row))
    }

    /// Pad or truncate every row to the header width.
    pub fn normalize(&mut self) {
        let width = self.header.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }
}

/// Backend-agnostic spreadsheet store.
///
/// Reads and writes are whole-table; there is no row-level API. Concurrent
/// writers from different processes race with last-write-wins.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    /// Short name for logs (`libsql`, `google-sheets`).
    fn name(&self) -> &str;

    /// Read a table. A table that does not exist yet reads as uninitialized.
    async fn read_table(&self, sheet: &str) -> Result<Table, DatabaseError>;

    /// Read a table past any caching layer. Read-modify-write callers use
    /// this so they never build on a copy older than the last write.
    async fn read_table_fresh(&self, sheet: &str) -> Result<Table, DatabaseError> {
        self.read_table(sheet).await
    }

    /// Replace a table's entire contents.
    async fn write_table(&self, sheet: &str, table: &Table) -> Result<(), DatabaseError>;
}
