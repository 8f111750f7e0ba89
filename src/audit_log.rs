// 🗂️ Audit Workbook - Newly discovered supplier items, kept in .xlsx
//
// Columns: Supplier code | Name | Price | Addition flag
// The workbook is read with calamine and rewritten whole with rust_xlsxwriter.

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::SyncConfig;
use crate::providers::AuditLogStore;
use crate::records::AuditLogEntry;

pub const AUDIT_SHEET_NAME: &str = "New articles";
pub const AUDIT_HEADERS: [&str; 4] = ["Supplier code", "Name", "Price", "Addition flag"];

pub struct XlsxAuditLog {
    path: PathBuf,
}

impl XlsxAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        XlsxAuditLog { path: path.into() }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.audit_log.path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLogStore for XlsxAuditLog {
    fn load(&mut self) -> Result<Vec<AuditLogEntry>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no audit workbook yet");
            return Ok(Vec::new());
        }

        let mut workbook = open_workbook_auto(&self.path)
            .with_context(|| format!("Failed to open audit workbook {:?}", self.path))?;
        let sheet_names = workbook.sheet_names().to_vec();
        let Some(first) = sheet_names.first() else {
            return Ok(Vec::new());
        };
        let range = workbook
            .worksheet_range(first)
            .with_context(|| format!("Failed to read sheet '{}' of {:?}", first, self.path))?;

        let mut entries = Vec::new();
        for (idx, row) in range.rows().enumerate().skip(1) {
            if row.iter().all(|c| matches!(c, Data::Empty)) {
                continue;
            }
            // Every row is written back on save, so an unreadable one must stop the pass
            let Some(entry) = parse_entry(row) else {
                bail!(
                    "Audit workbook {:?} row {} has an unreadable key or price",
                    self.path,
                    idx + 1
                );
            };
            entries.push(entry);
        }

        Ok(entries)
    }

    fn save(&mut self, entries: &[AuditLogEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(AUDIT_SHEET_NAME)?;

        for (col, header) in AUDIT_HEADERS.iter().enumerate() {
            worksheet.write_string(0, col as u16, *header)?;
        }
        for (idx, entry) in entries.iter().enumerate() {
            let row = (idx + 1) as u32;
            worksheet.write_number(row, 0, entry.numeric_key as f64)?;
            worksheet.write_string(row, 1, entry.name.as_str())?;
            worksheet.write_number(row, 2, entry.price)?;
            worksheet.write_string(row, 3, entry.addition_marker.as_str())?;
        }

        let tmp = self.path.with_extension("xlsx.tmp");
        workbook
            .save(&tmp)
            .with_context(|| format!("Failed to write audit workbook {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace audit workbook {:?}", self.path))?;

        debug!(rows = entries.len(), path = %self.path.display(), "audit workbook saved");
        Ok(())
    }
}

fn parse_entry(row: &[Data]) -> Option<AuditLogEntry> {
    let numeric_key = match row.first()? {
        Data::Int(n) if *n >= 0 => *n as u64,
        Data::Float(f) if *f >= 0.0 && f.fract() == 0.0 => *f as u64,
        Data::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let price = match row.get(2)? {
        Data::Float(f) => *f,
        Data::Int(n) => *n as f64,
        Data::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };

    Some(AuditLogEntry {
        numeric_key,
        name: row.get(1).map(cell_text).unwrap_or_default(),
        price,
        addition_marker: row.get(3).map(cell_text).unwrap_or_default(),
    })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}
