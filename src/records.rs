// 📦 Typed Records - The two tabular shapes the engine understands
//
// Rows are validated at the ingestion boundary (providers). Anything that
// reaches these structs is already well-formed.

use serde::{Deserialize, Serialize};

// ============================================================================
// AVAILABILITY
// ============================================================================

/// Availability flag as stored in the shared sheet ('+' / '-')
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Availability {
    #[serde(rename = "+")]
    Available,
    #[serde(rename = "-")]
    Unavailable,
}

impl Availability {
    /// Parse the external cell value. Anything but '+' / '-' is rejected.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim() {
            "+" => Some(Availability::Available),
            "-" => Some(Availability::Unavailable),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> &'static str {
        match self {
            Availability::Available => "+",
            Availability::Unavailable => "-",
        }
    }

    /// Availability implied by a supplier stock quantity
    pub fn from_quantity(quantity: i64) -> Self {
        if quantity > 0 {
            Availability::Available
        } else {
            Availability::Unavailable
        }
    }
}

// ============================================================================
// SUPPLIER RECORD
// ============================================================================

/// One row of the supplier catalogue snapshot.
///
/// Column names match the scraper's export (`article,names,prices,quantities`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierRecord {
    #[serde(rename = "article")]
    pub article_id: u64,

    #[serde(rename = "names")]
    pub name: String,

    #[serde(rename = "prices")]
    pub price: f64,

    /// Zero or negative means out of stock
    #[serde(rename = "quantities")]
    pub quantity: i64,
}

impl SupplierRecord {
    pub fn new(article_id: u64, name: impl Into<String>, price: f64, quantity: i64) -> Self {
        SupplierRecord {
            article_id,
            name: name.into(),
            price,
            quantity,
        }
    }

    pub fn is_available(&self) -> bool {
        self.quantity > 0
    }
}

// ============================================================================
// SHEET RECORD
// ============================================================================

/// One row of the shared sheet that carries a recognised supplier code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRecord {
    /// Raw code as stored in the sheet, e.g. "SP_4309"
    pub supplier_code: String,

    /// Join key extracted from `supplier_code`
    pub numeric_key: u64,

    pub availability: Availability,

    pub price: f64,

    /// 1-based row in the backing sheet (header is row 1)
    pub row_position: u32,

    /// Set by the engine when this row must be written back
    #[serde(default)]
    pub change_flag: bool,
}

impl SheetRecord {
    pub fn new(
        supplier_code: impl Into<String>,
        numeric_key: u64,
        availability: Availability,
        price: f64,
        row_position: u32,
    ) -> Self {
        SheetRecord {
            supplier_code: supplier_code.into(),
            numeric_key,
            availability,
            price,
            row_position,
            change_flag: false,
        }
    }
}

// ============================================================================
// AUDIT LOG ENTRY
// ============================================================================

/// Marker written into every audit entry the engine appends
pub const ADDITION_MARKER: &str = "-";

/// One row of the local audit workbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub numeric_key: u64,
    pub name: String,
    pub price: f64,
    pub addition_marker: String,
}

impl AuditLogEntry {
    /// Project a supplier record into an audit entry, flagged with `ADDITION_MARKER`
    pub fn from_supplier(record: &SupplierRecord) -> Self {
        AuditLogEntry {
            numeric_key: record.article_id,
            name: record.name.clone(),
            price: record.price,
            addition_marker: ADDITION_MARKER.to_string(),
        }
    }
}

// ============================================================================
// WRITE-BACK ROW
// ============================================================================

/// What gets persisted for a flagged sheet row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteBackRow {
    pub row_position: u32,
    pub availability: Availability,
    /// Already rounded for the sheet
    pub price: f64,
}

/// Round to `decimals` places, ties to even (0.125 -> 0.12, 0.375 -> 0.38)
pub fn round_price(price: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (price * factor).round_ties_even() / factor
}
