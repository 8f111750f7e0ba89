// ⚖️ Reconciliation Engine - Supplier catalogue vs shared sheet
//
// One pass:
//   supplier snapshot + sheet snapshot + audit log
//     → new audit entries (appended, whole-file rewrite)
//     → patched sheet records (copy-on-write, change_flag set)
//     → write-back of flagged rows only
//
// Sheet rows are joined to supplier rows on numeric_key == article_id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::deduplication::NewRecordSelector;
use crate::error::SyncError;
use crate::events::{SyncEvent, SyncObserver};
use crate::providers::{AuditLogStore, SheetProvider, SheetWriter, SupplierProvider};
use crate::records::{
    round_price, AuditLogEntry, Availability, SheetRecord, SupplierRecord, WriteBackRow,
};

// ============================================================================
// CHANGES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeKind {
    PriceChanged { old: f64, new: f64 },
    /// '+' → '-' because the supplier has no stock
    MarkedUnavailable,
    /// '-' → '+' because the supplier has stock again
    MarkedAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub row_position: u32,
    pub numeric_key: u64,
    pub kind: ChangeKind,
}

/// Result of diffing one sheet row against its supplier match
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDiff {
    pub record: SheetRecord,
    pub changes: Vec<ChangeKind>,
}

/// Result of diffing a whole sheet snapshot
#[derive(Debug, Clone, Default)]
pub struct DiffOutcome {
    /// Same order as the input sheet dataset
    pub records: Vec<SheetRecord>,
    pub changes: Vec<RowChange>,
    /// Sheet rows that found a supplier match
    pub matched: usize,
}

impl DiffOutcome {
    pub fn flagged_count(&self) -> usize {
        self.records.iter().filter(|r| r.change_flag).count()
    }

    pub fn price_changes(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| matches!(c.kind, ChangeKind::PriceChanged { .. }))
            .count()
    }

    pub fn marked_unavailable(&self) -> usize {
        self.count_kind(&ChangeKind::MarkedUnavailable)
    }

    pub fn marked_available(&self) -> usize {
        self.count_kind(&ChangeKind::MarkedAvailable)
    }

    fn count_kind(&self, kind: &ChangeKind) -> usize {
        self.changes.iter().filter(|c| &c.kind == kind).count()
    }
}

// ============================================================================
// WRITE-BACK SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct WriteBackSummary {
    pub written: usize,
    /// One WriteBackFailure per skipped row
    pub failures: Vec<SyncError>,
}

impl WriteBackSummary {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub supplier_count: usize,
    pub sheet_count: usize,
    pub matched: usize,
    pub price_changes: usize,
    pub marked_unavailable: usize,
    pub marked_available: usize,
    pub rows_flagged: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub write_failures: Vec<String>,
    pub changes: Vec<RowChange>,
    pub new_entries: Vec<AuditLogEntry>,
    pub audit_log_size: usize,
    pub snapshot_fingerprint: String,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.rows_skipped == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Pass {}: {} supplier / {} sheet rows, {} matched, {} flagged ({} price, {} -, {} +), {} written, {} skipped, {} new audit entries",
            self.run_id,
            self.supplier_count,
            self.sheet_count,
            self.matched,
            self.rows_flagged,
            self.price_changes,
            self.marked_unavailable,
            self.marked_available,
            self.rows_written,
            self.rows_skipped,
            self.new_entries.len()
        )
    }
}

// ============================================================================
// SHEET BACKEND
// ============================================================================

/// A shared sheet that is read and written through the same handle
pub trait SheetBackend: SheetProvider + SheetWriter {}

impl<T: SheetProvider + SheetWriter> SheetBackend for T {}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Decimal places applied to prices at the write boundary (default: 2)
    pub price_decimals: u32,

    selector: NewRecordSelector,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            price_decimals: 2,
            selector: NewRecordSelector::new(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        ReconciliationEngine {
            price_decimals: config.price_decimals,
            selector: NewRecordSelector::new(),
        }
    }

    /// Apply the price and availability rules to one matched row.
    ///
    /// The three checks are independent; a row can change price and
    /// availability in the same pass. The input is never modified.
    pub fn diff_record(&self, sheet: &SheetRecord, supplier: &SupplierRecord) -> RecordDiff {
        let mut record = sheet.clone();
        let mut changes = Vec::new();

        // Exact comparison, rounding happens only when writing
        if record.price != supplier.price {
            changes.push(ChangeKind::PriceChanged {
                old: record.price,
                new: supplier.price,
            });
            record.price = supplier.price;
            record.change_flag = true;
        }

        if record.availability == Availability::Available && supplier.quantity <= 0 {
            record.availability = Availability::Unavailable;
            record.change_flag = true;
            changes.push(ChangeKind::MarkedUnavailable);
        } else if record.availability == Availability::Unavailable && supplier.quantity > 0 {
            record.availability = Availability::Available;
            record.change_flag = true;
            changes.push(ChangeKind::MarkedAvailable);
        }

        RecordDiff { record, changes }
    }

    /// Diff every sheet row against the supplier snapshot.
    ///
    /// Rows without a supplier match are copied unchanged. When an article id
    /// repeats in the snapshot, the first occurrence is the match.
    pub fn apply_diff(&self, sheet: &[SheetRecord], supplier: &[SupplierRecord]) -> DiffOutcome {
        let mut by_article: HashMap<u64, &SupplierRecord> = HashMap::with_capacity(supplier.len());
        for record in supplier {
            by_article.entry(record.article_id).or_insert(record);
        }

        let mut outcome = DiffOutcome {
            records: Vec::with_capacity(sheet.len()),
            ..Default::default()
        };

        for row in sheet {
            let Some(matched) = by_article.get(&row.numeric_key) else {
                let mut untouched = row.clone();
                untouched.change_flag = false;
                outcome.records.push(untouched);
                continue;
            };

            outcome.matched += 1;
            let diff = self.diff_record(row, matched);

            for kind in diff.changes {
                debug!(
                    row = row.row_position,
                    key = row.numeric_key,
                    change = ?kind,
                    "sheet row changed"
                );
                outcome.changes.push(RowChange {
                    row_position: row.row_position,
                    numeric_key: row.numeric_key,
                    kind,
                });
            }
            outcome.records.push(diff.record);
        }

        outcome
    }

    /// Supplier items to append to the audit log
    pub fn select_new_records(
        &self,
        sheet: &[SheetRecord],
        supplier: &[SupplierRecord],
        audit_log: &[AuditLogEntry],
    ) -> Vec<AuditLogEntry> {
        self.selector.select(sheet, supplier, audit_log)
    }

    /// Flagged rows only, prices rounded for the sheet
    pub fn select_write_back(&self, records: &[SheetRecord]) -> Vec<WriteBackRow> {
        records
            .iter()
            .filter(|r| r.change_flag)
            .map(|r| WriteBackRow {
                row_position: r.row_position,
                availability: r.availability,
                price: round_price(r.price, self.price_decimals),
            })
            .collect()
    }

    /// Persist rows one by one. A failing row is skipped, never retried.
    pub fn write_back<W: SheetWriter + ?Sized>(
        &self,
        rows: &[WriteBackRow],
        writer: &mut W,
    ) -> WriteBackSummary {
        let mut summary = WriteBackSummary::default();

        for row in rows {
            match writer.write_row(row) {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    let failure = SyncError::WriteBackFailure {
                        row_position: row.row_position,
                        reason: format!("{:#}", e),
                    };
                    warn!("{}", failure);
                    summary.failures.push(failure);
                }
            }
        }

        summary
    }

    /// Run one complete reconciliation pass.
    ///
    /// Provider failures abort before anything is written. The audit log is
    /// rewritten before the sheet rows are written back.
    pub fn run_pass(
        &self,
        supplier_provider: &mut dyn SupplierProvider,
        sheet: &mut dyn SheetBackend,
        audit_log: &mut dyn AuditLogStore,
        observer: &mut dyn SyncObserver,
    ) -> Result<ReconciliationReport, SyncError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        observer.notify(&SyncEvent::PassStarted {
            run_id: run_id.clone(),
        });

        observer.notify(&SyncEvent::Progress("Fetching supplier catalogue".to_string()));
        let supplier = supplier_provider
            .fetch_records()
            .map_err(|e| SyncError::provider_unavailable(supplier_provider.name(), format!("{:#}", e)))?;

        observer.notify(&SyncEvent::Progress("Fetching shared sheet".to_string()));
        let sheet_records = sheet
            .fetch_records()
            .map_err(|e| SyncError::provider_unavailable(sheet.name(), format!("{:#}", e)))?;

        let existing_log = audit_log
            .load()
            .map_err(|e| SyncError::provider_unavailable("audit log", format!("{:#}", e)))?;

        info!(
            supplier_rows = supplier.len(),
            sheet_rows = sheet_records.len(),
            audit_rows = existing_log.len(),
            "datasets loaded"
        );
        observer.notify(&SyncEvent::Progress("Reconciling datasets".to_string()));

        // New supplier items → audit log (single rewrite)
        let new_entries = self.select_new_records(&sheet_records, &supplier, &existing_log);
        let updated_log = self.selector.append(existing_log, &new_entries);
        audit_log.save(&updated_log).map_err(|e| SyncError::Persist {
            target: "audit log".to_string(),
            reason: format!("{:#}", e),
        })?;
        info!(appended = new_entries.len(), total = updated_log.len(), "audit log saved");

        // Changed sheet rows → write-back
        let outcome = self.apply_diff(&sheet_records, &supplier);
        let rows = self.select_write_back(&outcome.records);
        observer.notify(&SyncEvent::Progress(format!(
            "Writing {} changed rows to the shared sheet",
            rows.len()
        )));
        let written = self.write_back(&rows, sheet);

        let report = ReconciliationReport {
            run_id: run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            supplier_count: supplier.len(),
            sheet_count: sheet_records.len(),
            matched: outcome.matched,
            price_changes: outcome.price_changes(),
            marked_unavailable: outcome.marked_unavailable(),
            marked_available: outcome.marked_available(),
            rows_flagged: rows.len(),
            rows_written: written.written,
            rows_skipped: written.skipped(),
            write_failures: written.failures.iter().map(|f| f.to_string()).collect(),
            changes: outcome.changes,
            new_entries,
            audit_log_size: updated_log.len(),
            snapshot_fingerprint: snapshot_fingerprint(&supplier),
        };

        info!("{}", report.summary());
        observer.notify(&SyncEvent::PassFinished {
            run_id,
            rows_written: report.rows_written,
            new_entries: report.new_entries.len(),
        });

        Ok(report)
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 over the snapshot sorted by article id; order of scraping does not matter
pub fn snapshot_fingerprint(records: &[SupplierRecord]) -> String {
    let mut sorted: Vec<&SupplierRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.article_id
            .cmp(&b.article_id)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut hasher = Sha256::new();
    for r in sorted {
        hasher.update(format!(
            "{}|{}|{}|{}\n",
            r.article_id, r.name, r.price, r.quantity
        ));
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;
    use crate::providers::{MemoryAuditLog, StaticSupplier};
    use anyhow::{anyhow, Result};

    fn sheet_row(key: u64, availability: Availability, price: f64, row: u32) -> SheetRecord {
        SheetRecord::new(format!("SP_{}", key), key, availability, price, row)
    }

    /// In-memory sheet; rows listed in `fail_rows` reject writes
    #[derive(Default)]
    struct FakeSheet {
        records: Vec<SheetRecord>,
        written: Vec<WriteBackRow>,
        fail_rows: Vec<u32>,
        unavailable: bool,
    }

    impl SheetProvider for FakeSheet {
        fn fetch_records(&mut self) -> Result<Vec<SheetRecord>> {
            if self.unavailable {
                return Err(anyhow!("authorization failed"));
            }
            Ok(self.records.clone())
        }
    }

    impl SheetWriter for FakeSheet {
        fn write_row(&mut self, row: &WriteBackRow) -> Result<()> {
            if self.fail_rows.contains(&row.row_position) {
                return Err(anyhow!("transient backend error"));
            }
            self.written.push(row.clone());
            Ok(())
        }
    }

    #[test]
    fn test_price_update() {
        let engine = ReconciliationEngine::new();
        let sheet = sheet_row(4309, Availability::Available, 10.00, 2);
        let supplier = SupplierRecord::new(4309, "Pliers", 12.50, 4);

        let diff = engine.diff_record(&sheet, &supplier);

        assert_eq!(diff.record.price, 12.50);
        assert!(diff.record.change_flag);
        assert_eq!(diff.record.availability, Availability::Available);
        assert_eq!(
            diff.changes,
            vec![ChangeKind::PriceChanged { old: 10.0, new: 12.5 }]
        );
        assert_eq!(sheet.price, 10.00, "input row must not be mutated");
        assert!(!sheet.change_flag);
    }

    #[test]
    fn test_availability_down_transition() {
        let engine = ReconciliationEngine::new();
        let sheet = sheet_row(1, Availability::Available, 5.0, 2);
        let supplier = SupplierRecord::new(1, "Saw", 5.0, 0);

        let diff = engine.diff_record(&sheet, &supplier);

        assert_eq!(diff.record.availability, Availability::Unavailable);
        assert!(diff.record.change_flag);
        assert_eq!(diff.changes, vec![ChangeKind::MarkedUnavailable]);
    }

    #[test]
    fn test_availability_up_transition() {
        let engine = ReconciliationEngine::new();
        let sheet = sheet_row(1, Availability::Unavailable, 5.0, 2);
        let supplier = SupplierRecord::new(1, "Saw", 5.0, 5);

        let diff = engine.diff_record(&sheet, &supplier);

        assert_eq!(diff.record.availability, Availability::Available);
        assert!(diff.record.change_flag);
        assert_eq!(diff.changes, vec![ChangeKind::MarkedAvailable]);
    }

    #[test]
    fn test_no_op_states_leave_flag_unset() {
        let engine = ReconciliationEngine::new();

        let in_stock = engine.diff_record(
            &sheet_row(1, Availability::Available, 5.0, 2),
            &SupplierRecord::new(1, "Saw", 5.0, 3),
        );
        let out_of_stock = engine.diff_record(
            &sheet_row(1, Availability::Unavailable, 5.0, 2),
            &SupplierRecord::new(1, "Saw", 5.0, -4),
        );

        assert!(!in_stock.record.change_flag);
        assert!(in_stock.changes.is_empty());
        assert!(!out_of_stock.record.change_flag);
        assert!(out_of_stock.changes.is_empty());
    }

    #[test]
    fn test_price_and_availability_cumulative() {
        let engine = ReconciliationEngine::new();
        let sheet = sheet_row(7, Availability::Available, 3.0, 9);
        let supplier = SupplierRecord::new(7, "Level", 3.2, 0);

        let diff = engine.diff_record(&sheet, &supplier);

        assert_eq!(diff.record.price, 3.2);
        assert_eq!(diff.record.availability, Availability::Unavailable);
        assert_eq!(diff.changes.len(), 2);
    }

    #[test]
    fn test_no_match_no_mutation() {
        let engine = ReconciliationEngine::new();
        let sheet = vec![sheet_row(555, Availability::Available, 8.0, 4)];
        let supplier = vec![SupplierRecord::new(1, "Other", 1.0, 0)];

        let outcome = engine.apply_diff(&sheet, &supplier);

        assert_eq!(outcome.records, sheet);
        assert_eq!(outcome.matched, 0);
        assert!(outcome.changes.is_empty());
        assert_eq!(outcome.flagged_count(), 0);
    }

    #[test]
    fn test_apply_diff_keeps_order_and_first_match() {
        let engine = ReconciliationEngine::new();
        let sheet = vec![
            sheet_row(3, Availability::Available, 1.0, 2),
            sheet_row(1, Availability::Unavailable, 2.0, 3),
            sheet_row(2, Availability::Available, 3.0, 5),
        ];
        let supplier = vec![
            SupplierRecord::new(1, "A", 2.0, 6),
            SupplierRecord::new(3, "C", 1.0, 1),
            SupplierRecord::new(3, "C later", 99.0, 0),
        ];

        let outcome = engine.apply_diff(&sheet, &supplier);

        let keys: Vec<u64> = outcome.records.iter().map(|r| r.numeric_key).collect();
        assert_eq!(keys, vec![3, 1, 2]);
        assert_eq!(outcome.matched, 2);
        assert!(!outcome.records[0].change_flag, "first occurrence of article 3 wins");
        assert!(outcome.records[1].change_flag);
        assert!(!outcome.records[2].change_flag);
        assert_eq!(outcome.marked_available(), 1);
        assert_eq!(outcome.price_changes(), 0);
    }

    #[test]
    fn test_flag_implies_difference() {
        let engine = ReconciliationEngine::new();
        let sheet = vec![
            sheet_row(1, Availability::Available, 1.0, 2),
            sheet_row(2, Availability::Available, 2.0, 3),
            sheet_row(3, Availability::Unavailable, 3.0, 4),
            sheet_row(4, Availability::Unavailable, 4.0, 5),
            sheet_row(5, Availability::Available, 5.0, 6),
        ];
        let supplier = vec![
            SupplierRecord::new(1, "a", 1.0, 1),
            SupplierRecord::new(2, "b", 2.5, 1),
            SupplierRecord::new(3, "c", 3.0, 2),
            SupplierRecord::new(4, "d", 4.0, 0),
            SupplierRecord::new(5, "e", 5.0, 0),
        ];

        let outcome = engine.apply_diff(&sheet, &supplier);

        for (before, after) in sheet.iter().zip(&outcome.records) {
            let differs = before.price != after.price || before.availability != after.availability;
            assert_eq!(after.change_flag, differs, "row {}", after.row_position);
        }
        assert_eq!(outcome.flagged_count(), 3);
    }

    #[test]
    fn test_write_back_selects_flagged_and_rounds() {
        let engine = ReconciliationEngine::new();
        let sheet = vec![
            sheet_row(1, Availability::Available, 10.0, 2),
            sheet_row(2, Availability::Available, 4.0, 3),
        ];
        let supplier = vec![
            SupplierRecord::new(1, "a", 10.004, 1),
            SupplierRecord::new(2, "b", 4.0, 1),
        ];

        let outcome = engine.apply_diff(&sheet, &supplier);
        // Comparison saw the unrounded price
        assert_eq!(outcome.records[0].price, 10.004);

        let rows = engine.select_write_back(&outcome.records);
        assert_eq!(
            rows,
            vec![WriteBackRow {
                row_position: 2,
                availability: Availability::Available,
                price: 10.0,
            }]
        );
    }

    #[test]
    fn test_write_back_failure_does_not_abort_batch() {
        let engine = ReconciliationEngine::new();
        let mut sheet = FakeSheet {
            fail_rows: vec![3],
            ..Default::default()
        };
        let rows: Vec<WriteBackRow> = (2..=4)
            .map(|row_position| WriteBackRow {
                row_position,
                availability: Availability::Unavailable,
                price: 1.0,
            })
            .collect();

        let summary = engine.write_back(&rows, &mut sheet);

        assert_eq!(summary.written, 2);
        assert_eq!(summary.skipped(), 1);
        assert!(matches!(
            summary.failures[0],
            SyncError::WriteBackFailure { row_position: 3, .. }
        ));
        let written: Vec<u32> = sheet.written.iter().map(|r| r.row_position).collect();
        assert_eq!(written, vec![2, 4]);
    }

    #[test]
    fn test_run_pass_end_to_end() {
        let engine = ReconciliationEngine::new();
        let mut supplier = StaticSupplier::new(vec![
            SupplierRecord::new(10, "Known, repriced", 12.5, 2),
            SupplierRecord::new(11, "Known, sold out", 3.0, 0),
            SupplierRecord::new(20, "New in stock", 7.0, 3),
            SupplierRecord::new(21, "New sold out", 8.0, 0),
        ]);
        let mut sheet = FakeSheet {
            records: vec![
                sheet_row(10, Availability::Available, 10.0, 2),
                sheet_row(11, Availability::Available, 3.0, 3),
                sheet_row(12, Availability::Unavailable, 1.0, 4),
            ],
            ..Default::default()
        };
        let mut audit = MemoryAuditLog::default();
        let mut observer = RecordingObserver::default();

        let report = engine
            .run_pass(&mut supplier, &mut sheet, &mut audit, &mut observer)
            .unwrap();

        assert_eq!(report.supplier_count, 4);
        assert_eq!(report.sheet_count, 3);
        assert_eq!(report.matched, 2);
        assert_eq!(report.price_changes, 1);
        assert_eq!(report.marked_unavailable, 1);
        assert_eq!(report.rows_written, 2);
        assert!(report.is_clean());
        assert_eq!(report.new_entries.len(), 1);
        assert_eq!(report.new_entries[0].numeric_key, 20);
        assert_eq!(audit.entries.len(), 1);
        assert_eq!(report.snapshot_fingerprint.len(), 64);

        assert!(matches!(observer.events.first(), Some(SyncEvent::PassStarted { .. })));
        assert!(matches!(
            observer.events.last(),
            Some(SyncEvent::PassFinished { rows_written: 2, new_entries: 1, .. })
        ));

        // Second pass over the same snapshot appends nothing
        let again = engine
            .run_pass(&mut supplier, &mut sheet, &mut audit, &mut observer)
            .unwrap();
        assert!(again.new_entries.is_empty());
        assert_eq!(audit.entries.len(), 1);
        assert_eq!(again.snapshot_fingerprint, report.snapshot_fingerprint);

        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_run_pass_provider_unavailable_is_fatal() {
        let engine = ReconciliationEngine::new();
        let mut supplier = StaticSupplier::new(vec![SupplierRecord::new(1, "a", 1.0, 1)]);
        let mut sheet = FakeSheet {
            unavailable: true,
            ..Default::default()
        };
        let mut audit = MemoryAuditLog::default();
        let mut observer = RecordingObserver::default();

        let err = engine
            .run_pass(&mut supplier, &mut sheet, &mut audit, &mut observer)
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, SyncError::ProviderUnavailable { .. }));
        assert_eq!(audit.saves, 0, "nothing is written when a provider fails");
        assert!(sheet.written.is_empty());
    }

    #[test]
    fn test_fingerprint_ignores_snapshot_order() {
        let a = vec![
            SupplierRecord::new(1, "a", 1.0, 1),
            SupplierRecord::new(2, "b", 2.0, 0),
        ];
        let b = vec![a[1].clone(), a[0].clone()];
        let c = vec![a[0].clone(), SupplierRecord::new(2, "b", 2.0, 5)];

        assert_eq!(snapshot_fingerprint(&a), snapshot_fingerprint(&b));
        assert_ne!(snapshot_fingerprint(&a), snapshot_fingerprint(&c));
    }
}
