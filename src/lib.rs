// Stock Sync - Core Library
// Supplier catalogue ↔ shared inventory sheet ↔ audit workbook

pub mod error;
pub mod config;
pub mod records;
pub mod key;             // Supplier code → numeric join key
pub mod deduplication;   // New-record selection against sheet + audit log
pub mod reconciliation;  // Diff rule, write-back, full pass
pub mod providers;       // Collaborator traits
pub mod events;
pub mod sheet;           // CSV shared sheet backend
pub mod supplier;        // Supplier snapshot reader
pub mod audit_log;       // xlsx audit workbook
pub mod db;              // SQLite run journal

// Re-export commonly used types
pub use error::SyncError;
pub use config::SyncConfig;
pub use records::{
    Availability, SupplierRecord, SheetRecord, AuditLogEntry, WriteBackRow,
    round_price, ADDITION_MARKER,
};
pub use key::KeyNormalizer;
pub use deduplication::NewRecordSelector;
pub use reconciliation::{
    ReconciliationEngine, ReconciliationReport, DiffOutcome, RecordDiff,
    RowChange, ChangeKind, WriteBackSummary, SheetBackend, snapshot_fingerprint,
};
pub use providers::{
    SupplierProvider, SheetProvider, SheetWriter, AuditLogStore,
    StaticSupplier, MemoryAuditLog,
};
pub use events::{SyncEvent, SyncObserver, NullObserver, LogObserver, RecordingObserver};
pub use sheet::{CsvSheet, SheetSchema, column_label};
pub use supplier::CsvSupplierProvider;
pub use audit_log::XlsxAuditLog;
pub use db::{
    RunRecord, Event,
    open_journal, setup_journal, record_run, recent_runs, last_fingerprint,
    get_events_for_run, insert_event, count_runs,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
