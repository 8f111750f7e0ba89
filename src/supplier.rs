// 🏭 Supplier Snapshot - Catalogue rows exported by the scraper
//
// CSV columns: article,names,prices,quantities
// Rows that fail to deserialize (or carry a negative/NaN price) are dropped
// with a warning; the rest of the snapshot is still usable.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::providers::SupplierProvider;
use crate::records::SupplierRecord;

pub struct CsvSupplierProvider {
    path: PathBuf,
}

impl CsvSupplierProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSupplierProvider { path: path.into() }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.supplier.path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SupplierProvider for CsvSupplierProvider {
    fn fetch_records(&mut self) -> Result<Vec<SupplierRecord>> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open supplier snapshot {:?}", self.path))?;

        let mut records = Vec::new();
        let mut rejected = 0;

        for (idx, result) in rdr.deserialize::<SupplierRecord>().enumerate() {
            // +2: header line, 1-based lines
            let line = idx + 2;
            match result {
                Ok(record) if record.price.is_finite() && record.price >= 0.0 => {
                    records.push(record)
                }
                Ok(record) => {
                    rejected += 1;
                    warn!(line, article = record.article_id, "supplier row has an invalid price");
                }
                Err(e) => {
                    rejected += 1;
                    warn!(line, "supplier row skipped: {}", e);
                }
            }
        }

        debug!(rows = records.len(), rejected, path = %self.path.display(), "supplier snapshot loaded");
        Ok(records)
    }
}
