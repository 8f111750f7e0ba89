// 📋 Shared Sheet - CSV-backed inventory sheet
//
// Layout: row 1 is the header, data starts at row 2. Row positions handed to
// the engine are these 1-based sheet rows, so a write-back lands on the same
// line it was read from.
//
// The column schema is resolved once, when the sheet is opened.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{SheetConfig, SyncConfig};
use crate::key::KeyNormalizer;
use crate::providers::{SheetProvider, SheetWriter};
use crate::records::{Availability, SheetRecord, WriteBackRow};

// ============================================================================
// SCHEMA
// ============================================================================

/// Spreadsheet column letters: 0 → "A", 25 → "Z", 26 → "AA"
pub fn column_label(index: usize) -> String {
    let mut label = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

/// Positions of the columns the sync reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSchema {
    headers: Vec<String>,
    columns: HashMap<String, usize>,
    pub supplier_code: usize,
    pub availability: usize,
    pub price: usize,
}

impl SheetSchema {
    pub fn from_headers(headers: &[String], config: &SheetConfig) -> Result<Self> {
        let mut columns = HashMap::new();
        for (idx, name) in headers.iter().enumerate() {
            // First column wins when a header repeats
            columns.entry(name.trim().to_string()).or_insert(idx);
        }

        let find = |name: &str| -> Result<usize> {
            columns
                .get(name)
                .copied()
                .with_context(|| format!("Sheet has no column named {:?}", name))
        };

        Ok(SheetSchema {
            supplier_code: find(&config.supplier_code_column)?,
            availability: find(&config.availability_column)?,
            price: find(&config.price_column)?,
            headers: headers.to_vec(),
            columns,
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// A1-style address, e.g. "C12"
    pub fn cell_address(&self, column: usize, row_position: u32) -> String {
        format!("{}{}", column_label(column), row_position)
    }

    pub fn availability_cell(&self, row_position: u32) -> String {
        self.cell_address(self.availability, row_position)
    }

    pub fn price_cell(&self, row_position: u32) -> String {
        self.cell_address(self.price, row_position)
    }
}

// ============================================================================
// CSV SHEET
// ============================================================================

pub struct CsvSheet {
    path: PathBuf,
    schema: SheetSchema,
    normalizer: KeyNormalizer,
    price_decimals: u32,
    /// Raw grid, header included (grid[0] is sheet row 1)
    grid: Vec<Vec<String>>,
}

impl CsvSheet {
    pub fn open(config: &SyncConfig) -> Result<Self> {
        Self::open_path(
            &config.sheet.path,
            &config.sheet,
            KeyNormalizer::from_config(config),
            config.price_decimals,
        )
    }

    pub fn open_path(
        path: &Path,
        sheet_config: &SheetConfig,
        normalizer: KeyNormalizer,
        price_decimals: u32,
    ) -> Result<Self> {
        let grid = read_grid(path)?;
        let headers = grid
            .first()
            .with_context(|| format!("Sheet {:?} is empty (no header row)", path))?;
        let schema = SheetSchema::from_headers(headers, sheet_config)?;

        debug!(
            path = %path.display(),
            code = %column_label(schema.supplier_code),
            availability = %column_label(schema.availability),
            price = %column_label(schema.price),
            "sheet schema resolved"
        );

        Ok(CsvSheet {
            path: path.to_path_buf(),
            schema,
            normalizer,
            price_decimals,
            grid,
        })
    }

    pub fn schema(&self) -> &SheetSchema {
        &self.schema
    }

    /// Re-read the file; the header must still match the opened schema
    fn reload(&mut self) -> Result<()> {
        let grid = read_grid(&self.path)?;
        match grid.first() {
            Some(headers) if headers.as_slice() == self.schema.headers() => {}
            _ => bail!("Sheet {:?} header changed since it was opened", self.path),
        }
        self.grid = grid;
        Ok(())
    }

    fn parse_row(&self, idx: usize, row: &[String]) -> Option<SheetRecord> {
        let row_position = (idx + 1) as u32;
        let cell = |col: usize| row.get(col).map(|s| s.trim()).unwrap_or("");

        let code = cell(self.schema.supplier_code);
        if !self.normalizer.has_prefix(code) {
            return None;
        }
        let numeric_key = match self.normalizer.parse(code) {
            Ok(key) => key,
            Err(e) => {
                debug!(row = row_position, "excluded: {}", e);
                return None;
            }
        };

        let Some(availability) = Availability::from_flag(cell(self.schema.availability)) else {
            warn!(
                cell = %self.schema.availability_cell(row_position),
                value = cell(self.schema.availability),
                "excluded: availability is neither '+' nor '-'"
            );
            return None;
        };

        let Some(price) = parse_price(cell(self.schema.price)) else {
            warn!(
                cell = %self.schema.price_cell(row_position),
                value = cell(self.schema.price),
                "excluded: price is not a non-negative number"
            );
            return None;
        };

        Some(SheetRecord::new(code, numeric_key, availability, price, row_position))
    }

    /// Write the grid through a temp file so a crash never leaves half a sheet
    fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut wtr = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&tmp)
                .with_context(|| format!("Failed to create {:?}", tmp))?;
            for row in &self.grid {
                wtr.write_record(row)?;
            }
            wtr.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace sheet {:?}", self.path))?;
        Ok(())
    }
}

impl SheetProvider for CsvSheet {
    fn fetch_records(&mut self) -> Result<Vec<SheetRecord>> {
        self.reload()?;

        let records: Vec<SheetRecord> = self
            .grid
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(idx, row)| self.parse_row(idx, row))
            .collect();

        debug!(
            rows = self.grid.len().saturating_sub(1),
            kept = records.len(),
            prefix = self.normalizer.prefix(),
            "sheet rows filtered by supplier prefix"
        );
        Ok(records)
    }
}

impl SheetWriter for CsvSheet {
    fn write_row(&mut self, row: &WriteBackRow) -> Result<()> {
        let idx = row.row_position as usize;
        if idx < 2 || idx > self.grid.len() {
            bail!(
                "row {} is outside the data range 2..={}",
                row.row_position,
                self.grid.len()
            );
        }

        let price = format!("{:.*}", self.price_decimals as usize, row.price);
        let width = self.schema.availability.max(self.schema.price) + 1;
        let mut line = self.grid[idx - 1].clone();
        if line.len() < width {
            line.resize(width, String::new());
        }
        line[self.schema.availability] = row.availability.as_flag().to_string();
        line[self.schema.price] = price;

        // The grid only keeps the new line once it is on disk
        let previous = std::mem::replace(&mut self.grid[idx - 1], line);
        if let Err(e) = self.persist() {
            self.grid[idx - 1] = previous;
            return Err(e);
        }
        debug!(
            availability = %self.schema.availability_cell(row.row_position),
            price = %self.schema.price_cell(row.row_position),
            "sheet row written"
        );
        Ok(())
    }
}

fn read_grid(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open sheet {:?}", path))?;

    let mut grid = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read sheet {:?}", path))?;
        grid.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(grid)
}

/// Blank cells count as 0.0; a decimal comma is accepted
fn parse_price(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return Some(0.0);
    }
    let price: f64 = raw.replace(',', ".").parse().ok()?;
    if price.is_finite() && price >= 0.0 {
        Some(price)
    } else {
        None
    }
}
