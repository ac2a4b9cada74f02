//! # Sheet Module
//!
//! Tabular data fetched from spreadsheet CSV exports: the roster, the
//! per-region meter datasets and the fiber-line dataset all share this shape.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::SourceError;

/// A parsed table: trimmed header names plus rows of trimmed cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Borrowed view of one row, addressed by column name
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    sheet: &'a Sheet,
    cells: &'a [String],
}

impl Sheet {
    /// Parse CSV text. The first record is the header line; a UTF-8 BOM is dropped.
    pub fn from_csv(text: &str) -> Result<Self, csv::Error> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column with exactly this name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// First column whose lower-cased name contains `needle` (lower-cased too)
    pub fn find_column_containing(&self, needle: &str) -> Option<usize> {
        let needle = needle.to_lowercase();
        self.headers
            .iter()
            .position(|h| h.to_lowercase().contains(&needle))
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        self.rows.iter().map(move |cells| Row { sheet: self, cells })
    }
}

impl<'a> Row<'a> {
    /// Value of the named column; `None` when the column does not exist or the cell is empty
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.sheet
            .column_index(column)
            .and_then(|i| self.at(i))
    }

    /// Value at a column index; `None` for empty cells
    pub fn at(&self, index: usize) -> Option<&'a str> {
        self.cells
            .get(index)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Cell at an index, empty string when absent
    pub fn raw(&self, index: usize) -> &'a str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Where sheets come from
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Sheet, SourceError>;
}

/// Fetches CSV exports over HTTP
pub struct HttpSheetSource {
    client: reqwest::Client,
}

impl HttpSheetSource {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SheetSource for HttpSheetSource {
    async fn fetch(&self, url: &str) -> Result<Sheet, SourceError> {
        debug!(url = %url, "Fetching sheet");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| SourceError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let sheet = Sheet::from_csv(&body).map_err(|e| SourceError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!(url = %url, rows = sheet.len(), "Sheet fetched");
        Ok(sheet)
    }
}
