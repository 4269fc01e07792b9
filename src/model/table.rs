//! The transaction table: a CSV file held as rows of strings so that every column survives the
//! round trip, with typed access to the handful of columns the pipeline reads and writes.

use crate::model::{ClassificationResult, Transaction};
use crate::{utils, Result};
use anyhow::{bail, Context};
use std::collections::HashMap;
use std::path::Path;

pub const DESCRIPTION: &str = "Description";
pub const AMOUNT: &str = "Amount";
pub const CATEGORY: &str = "Category";
pub const CONFIDENCE: &str = "Confidence";

/// Columns that must be present in the input.
const REQUIRED: &[&str] = &[DESCRIPTION, AMOUNT];

/// A CSV table with a header row. Column order and any columns the pipeline does not know about
/// are preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    header_map: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from a header row and data rows. Short rows are padded with empty cells.
    pub fn new<S, R>(headers: R, rows: impl IntoIterator<Item = R>) -> Result<Self>
    where
        S: Into<String>,
        R: IntoIterator<Item = S>,
    {
        // Blank header cells are named by position, as spreadsheet exports leave them.
        let headers: Vec<String> = headers
            .into_iter()
            .enumerate()
            .map(|(ix, s)| {
                let header: String = s.into();
                if header.trim().is_empty() {
                    format!("Unnamed: {ix}")
                } else {
                    header
                }
            })
            .collect();
        let header_map: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(ix, h)| (h.trim().to_string(), ix))
            .collect();
        if header_map.len() != headers.len() {
            bail!("Encountered a duplicate header in {headers:?}");
        }

        let width = headers.len();
        let mut data = Vec::new();
        for (row_ix, row) in rows.into_iter().enumerate() {
            let mut values: Vec<String> = row.into_iter().map(|s| s.into()).collect();
            if values.len() > width {
                bail!(
                    "A row longer than the headers list was encountered at line {}",
                    row_ix + 2
                );
            }
            values.resize(width, String::new());
            data.push(values);
        }

        Ok(Self {
            headers,
            header_map,
            rows: data,
        })
    }

    /// Parse CSV text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers: Vec<String> = reader
            .headers()
            .context("Unable to read the CSV header row")?
            .iter()
            .map(|h| h.to_string())
            .collect();
        let mut rows = Vec::new();
        for (ix, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Unable to read CSV record {}", ix + 1))?;
            rows.push(record.iter().map(|s| s.to_string()).collect::<Vec<String>>());
        }
        Self::new(headers, rows)
    }

    /// Read a CSV file, tolerating the encodings spreadsheet exports tend to use.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = utils::read_bytes(path).await?;
        let text = decode(&bytes);
        Self::parse(&text).with_context(|| format!("Unable to parse CSV file {}", path.display()))
    }

    /// Serialize to CSV text.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Unable to flush CSV writer: {e}"))?;
        String::from_utf8(bytes).context("CSV output was not valid UTF-8")
    }

    /// Write the table to `path`, replacing any existing file atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let csv = self.to_csv()?;
        utils::write_atomic(path, csv)
            .await
            .with_context(|| format!("Unable to write output table {}", path.display()))
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

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.header_map.get(header).copied()
    }

    pub fn cell(&self, row: usize, header: &str) -> Option<&str> {
        let col = self.column_index(header)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Fails when a column the pipeline depends on is missing, naming what was found instead.
    pub fn require_columns(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED
            .iter()
            .copied()
            .filter(|h| self.column_index(h).is_none())
            .collect();
        if !missing.is_empty() {
            bail!(
                "The input table must include the columns {REQUIRED:?}, missing {missing:?}. \
                Found: {:?}",
                self.headers
            );
        }
        Ok(())
    }

    /// Appends an empty column unless one with this header already exists.
    pub fn ensure_column(&mut self, header: &str) -> usize {
        if let Some(ix) = self.column_index(header) {
            return ix;
        }
        let ix = self.headers.len();
        self.headers.push(header.to_string());
        self.header_map.insert(header.to_string(), ix);
        for row in &mut self.rows {
            row.push(String::new());
        }
        ix
    }

    /// Typed views of every row, in input order.
    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        self.require_columns()?;
        let mut out = Vec::with_capacity(self.rows.len());
        for row_id in 0..self.rows.len() {
            let description = self.cell(row_id, DESCRIPTION).unwrap_or_default();
            let amount = self.cell(row_id, AMOUNT).unwrap_or_default();
            let mut txn = Transaction::new(row_id, description, amount);
            let category = self
                .cell(row_id, CATEGORY)
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string());
            let confidence = self
                .cell(row_id, CONFIDENCE)
                .and_then(|s| s.trim().parse::<f64>().ok());
            txn.set_existing(category, confidence);
            out.push(txn);
        }
        Ok(out)
    }

    /// Writes a result into the `Category` and `Confidence` cells of its row.
    pub fn apply(&mut self, result: &ClassificationResult) -> Result<()> {
        let category_ix = self.ensure_column(CATEGORY);
        let confidence_ix = self.ensure_column(CONFIDENCE);
        let row = self
            .rows
            .get_mut(result.row_id)
            .with_context(|| format!("No row with id {} in the table", result.row_id))?;
        row[category_ix] = result.category.clone();
        row[confidence_ix] = format_confidence(result.confidence);
        Ok(())
    }
}

/// Writes a confidence as a plain decimal, always with a fractional part (`1.0`, `0.2`, `0.85`).
pub fn format_confidence(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Decodes file bytes: UTF-8 (with or without a byte order mark), UTF-16 with a byte order mark,
/// and otherwise Latin-1, which maps every byte to a character and so never fails.
fn decode(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
