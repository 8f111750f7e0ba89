// 🔍 New-Record Selector - Supplier items the shared sheet does not know yet
//
// A supplier record becomes an audit entry when all three hold:
//   1. its article id is not a numeric key of the shared sheet
//   2. it is in stock (quantity > 0)
//   3. its article id is not already in the audit log
//
// Rule 3 makes the append idempotent: a second pass over the same snapshot
// appends nothing.

use std::collections::HashSet;

use crate::records::{AuditLogEntry, SheetRecord, SupplierRecord};

pub struct NewRecordSelector;

impl NewRecordSelector {
    pub fn new() -> Self {
        NewRecordSelector
    }

    /// Entries to append, in supplier snapshot order
    pub fn select(
        &self,
        sheet: &[SheetRecord],
        supplier: &[SupplierRecord],
        audit_log: &[AuditLogEntry],
    ) -> Vec<AuditLogEntry> {
        let sheet_keys: HashSet<u64> = sheet.iter().map(|r| r.numeric_key).collect();
        let mut known: HashSet<u64> = audit_log.iter().map(|e| e.numeric_key).collect();

        supplier
            .iter()
            .filter(|r| !sheet_keys.contains(&r.article_id))
            .filter(|r| r.is_available())
            // `insert` is false for keys already logged or already taken from this snapshot
            .filter(|r| known.insert(r.article_id))
            .map(AuditLogEntry::from_supplier)
            .collect()
    }

    /// Existing rows untouched, new rows at the end
    pub fn append(
        &self,
        mut audit_log: Vec<AuditLogEntry>,
        new_entries: &[AuditLogEntry],
    ) -> Vec<AuditLogEntry> {
        audit_log.extend_from_slice(new_entries);
        audit_log
    }
}

impl Default for NewRecordSelector {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
