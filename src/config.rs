// ⚙️ Configuration - Everything the engine and providers need, loaded once
//
// JSON file, every field optional. Example:
//
// {
//   "supplier_prefix": "SP",
//   "sheet": { "path": "data/inventory.csv", "price_column": "Price" },
//   "audit_log": { "path": "data/new_articles.xlsx" }
// }

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// CSV export of the shared inventory sheet
    pub path: PathBuf,
    pub supplier_code_column: String,
    pub availability_column: String,
    pub price_column: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        SheetConfig {
            path: PathBuf::from("data/inventory.csv"),
            supplier_code_column: "Supplier code".to_string(),
            availability_column: "Availability".to_string(),
            price_column: "Price".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplierConfig {
    /// Catalogue snapshot written by the scraper
    pub path: PathBuf,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        SupplierConfig {
            path: PathBuf::from("data/supplier.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditLogConfig {
    pub path: PathBuf,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        AuditLogConfig {
            path: PathBuf::from("data/new_articles.xlsx"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub path: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        JournalConfig {
            path: PathBuf::from("data/sync_journal.db"),
        }
    }
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Two-character prefix of supplier codes handled by this sync
    pub supplier_prefix: String,

    /// Single character between prefix and digits ("SP_4309")
    pub key_separator: char,

    /// Decimal places of prices written back to the sheet
    pub price_decimals: u32,

    pub sheet: SheetConfig,
    pub supplier: SupplierConfig,
    pub audit_log: AuditLogConfig,
    pub journal: JournalConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            supplier_prefix: "SP".to_string(),
            key_separator: '_',
            price_decimals: 2,
            sheet: SheetConfig::default(),
            supplier: SupplierConfig::default(),
            audit_log: AuditLogConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load config from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: SyncConfig =
            serde_json::from_str(content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the key normalizer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.supplier_prefix.chars().count() != 2 {
            bail!(
                "supplier_prefix must be exactly two characters, got {:?}",
                self.supplier_prefix
            );
        }
        if self.key_separator.is_ascii_digit() {
            bail!("key_separator must not be a digit");
        }
        if self.price_decimals > 6 {
            bail!("price_decimals must be at most 6, got {}", self.price_decimals);
        }
        Ok(())
    }
}
