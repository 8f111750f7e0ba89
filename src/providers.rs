// 🔌 Collaborator Traits - Where datasets come from and where changes go
//
// The engine only talks to these traits. Concrete backends live in
// sheet.rs (CSV shared sheet), supplier.rs (catalogue snapshot) and
// audit_log.rs (xlsx workbook).

use anyhow::Result;

use crate::records::{AuditLogEntry, SheetRecord, SupplierRecord, WriteBackRow};

/// Supplier catalogue snapshot.
///
/// Returns the complete, finite snapshot or fails. No ordering guarantee.
pub trait SupplierProvider {
    fn fetch_records(&mut self) -> Result<Vec<SupplierRecord>>;

    /// Label used in logs and errors
    fn name(&self) -> &str {
        "supplier catalogue"
    }
}

/// Shared sheet reader.
///
/// Must hand over only rows whose supplier code yields a numeric key.
pub trait SheetProvider {
    fn fetch_records(&mut self) -> Result<Vec<SheetRecord>>;

    fn name(&self) -> &str {
        "shared sheet"
    }
}

/// Shared sheet writer, one row per call.
///
/// A failing call affects only that row; the engine does not retry.
pub trait SheetWriter {
    fn write_row(&mut self, row: &WriteBackRow) -> Result<()>;
}

/// Audit log persistence
pub trait AuditLogStore {
    /// Existing entries, empty when the log does not exist yet
    fn load(&mut self) -> Result<Vec<AuditLogEntry>>;

    /// Replace the whole log with `entries`
    fn save(&mut self, entries: &[AuditLogEntry]) -> Result<()>;
}

// ============================================================================
// IN-MEMORY BACKENDS
// ============================================================================

/// Fixed supplier snapshot, e.g. handed over by an in-process scraper
#[derive(Debug, Clone, Default)]
pub struct StaticSupplier {
    pub records: Vec<SupplierRecord>,
}

impl StaticSupplier {
    pub fn new(records: Vec<SupplierRecord>) -> Self {
        StaticSupplier { records }
    }
}

impl SupplierProvider for StaticSupplier {
    fn fetch_records(&mut self) -> Result<Vec<SupplierRecord>> {
        Ok(self.records.clone())
    }
}

/// Audit log kept in memory; `save` replaces the contents
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    pub entries: Vec<AuditLogEntry>,
    pub saves: usize,
}

impl AuditLogStore for MemoryAuditLog {
    fn load(&mut self) -> Result<Vec<AuditLogEntry>> {
        Ok(self.entries.clone())
    }

    fn save(&mut self, entries: &[AuditLogEntry]) -> Result<()> {
        self.entries = entries.to_vec();
        self.saves += 1;
        Ok(())
    }
}
