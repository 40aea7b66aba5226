// Tabular records with nullable string cells, loaded from and stored to CSV

use crate::error::{CoreError, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

pub type Cell = Option<String>;

/// A header row plus rows of nullable cells. Empty CSV fields read as `None`
/// and `None` writes back as an empty field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of a column the caller cannot proceed without.
    pub fn require_column(&self, name: &str, source_name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| CoreError::MissingColumn {
            source_name: source_name.to_string(),
            column: name.to_string(),
        })
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.headers.len(), None);
        self.rows.push(row);
    }

    /// Append a row given as strings, treating empty strings as null.
    pub fn push_strings<S: AsRef<str>>(&mut self, row: impl IntoIterator<Item = S>) {
        let cells = row
            .into_iter()
            .map(|s| {
                let s = s.as_ref();
                (!s.is_empty()).then(|| s.to_string())
            })
            .collect();
        self.push_row(cells);
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .and_then(|c| c.as_deref())
    }

    pub fn get(&self, row: usize, column_name: &str) -> Option<&str> {
        self.column_index(column_name)
            .and_then(|column| self.cell(row, column))
    }

    /// All values of one column in row order; an absent column yields nothing.
    pub fn column_values<'a>(&'a self, name: &str) -> Vec<Option<&'a str>> {
        match self.column_index(name) {
            Some(column) => self
                .rows
                .iter()
                .map(|r| r.get(column).and_then(|c| c.as_deref()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// New table holding only the rows selected by `keep`.
    pub fn filter_rows(&self, mut keep: impl FnMut(usize) -> bool) -> Table {
        Table {
            headers: self.headers.clone(),
            rows: self
                .rows
                .iter()
                .enumerate()
                .filter(|(i, _)| keep(*i))
                .map(|(_, r)| r.clone())
                .collect(),
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let mut table = Table::new(headers);

        for record in csv_reader.records() {
            let record = record?;
            table.push_strings(record.iter());
        }

        Ok(table)
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::FileNotFound(path.to_path_buf()));
        }
        let table = Self::from_reader(File::open(path)?)?;
        tracing::debug!("Loaded {} rows from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.headers)?;
        for row in &self.rows {
            csv_writer.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        self.to_writer(File::create(path)?)?;
        tracing::debug!("Wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.to_writer(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| CoreError::InvalidValue {
            context: "CSV output".to_string(),
            value: e.to_string(),
        })
    }
}
