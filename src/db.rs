// 🗄️ Run Journal - SQLite history of reconciliation passes
//
// One row per pass plus an event trail, in WAL mode.
// Used by the CLI to show history and to spot unchanged supplier snapshots.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::reconciliation::ReconciliationReport;

/// One journaled pass (the columns the CLI lists)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub supplier_count: i64,
    pub sheet_count: i64,
    pub rows_written: i64,
    pub rows_skipped: i64,
    pub new_entries: i64,
    pub snapshot_fingerprint: String,
}

/// Event for the journal trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub run_id: String,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(event_type: &str, run_id: &str, data: serde_json::Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            run_id: run_id.to_string(),
            data,
        }
    }
}

pub fn open_journal(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open journal {:?}", path))?;
    setup_journal(&conn)?;
    Ok(conn)
}

pub fn setup_journal(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Runs Table (one row per reconciliation pass)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            supplier_count INTEGER NOT NULL,
            sheet_count INTEGER NOT NULL,
            rows_written INTEGER NOT NULL,
            rows_skipped INTEGER NOT NULL,
            new_entries INTEGER NOT NULL,
            snapshot_fingerprint TEXT NOT NULL,
            report TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (per-run trail: skipped rows, appended articles)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            run_id TEXT NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id)",
        [],
    )?;

    Ok(())
}

/// Journal a finished pass together with its event trail
pub fn record_run(conn: &Connection, report: &ReconciliationReport) -> Result<()> {
    let report_json = serde_json::to_string(report)?;

    conn.execute(
        "INSERT INTO runs (
            run_id, started_at, finished_at, supplier_count, sheet_count,
            rows_written, rows_skipped, new_entries, snapshot_fingerprint, report
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            report.run_id,
            report.started_at.to_rfc3339(),
            report.finished_at.to_rfc3339(),
            report.supplier_count as i64,
            report.sheet_count as i64,
            report.rows_written as i64,
            report.rows_skipped as i64,
            report.new_entries.len() as i64,
            report.snapshot_fingerprint,
            report_json,
        ],
    )
    .context("Failed to journal reconciliation run")?;

    for entry in &report.new_entries {
        insert_event(
            conn,
            &Event::new("article_added", &report.run_id, serde_json::to_value(entry)?),
        )?;
    }
    for failure in &report.write_failures {
        insert_event(
            conn,
            &Event::new(
                "write_back_skipped",
                &report.run_id,
                serde_json::json!({ "reason": failure }),
            ),
        )?;
    }

    Ok(())
}

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, run_id, data)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.run_id,
            data_json,
        ],
    )?;

    Ok(())
}

pub fn get_events_for_run(conn: &Connection, run_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, run_id, data
         FROM events
         WHERE run_id = ?1
         ORDER BY id",
    )?;

    let events = stmt
        .query_map(params![run_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(4)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                run_id: row.get(3)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
                })?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Most recent passes first
pub fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at, finished_at, supplier_count, sheet_count,
                rows_written, rows_skipped, new_entries, snapshot_fingerprint
         FROM runs
         ORDER BY started_at DESC, id DESC
         LIMIT ?1",
    )?;

    let runs = stmt
        .query_map(params![limit as i64], |row| {
            let started: String = row.get(1)?;
            let finished: String = row.get(2)?;

            Ok(RunRecord {
                run_id: row.get(0)?,
                started_at: parse_timestamp(1, &started)?,
                finished_at: parse_timestamp(2, &finished)?,
                supplier_count: row.get(3)?,
                sheet_count: row.get(4)?,
                rows_written: row.get(5)?,
                rows_skipped: row.get(6)?,
                new_entries: row.get(7)?,
                snapshot_fingerprint: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

/// Fingerprint of the latest journaled supplier snapshot
pub fn last_fingerprint(conn: &Connection) -> Result<Option<String>> {
    let fingerprint = conn
        .query_row(
            "SELECT snapshot_fingerprint FROM runs ORDER BY started_at DESC, id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(fingerprint)
}

pub fn count_runs(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
    Ok(count)
}

fn parse_timestamp(col: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::AuditLogEntry;
    use chrono::Duration;

    fn create_test_report(run_id: &str, offset_minutes: i64, fingerprint: &str) -> ReconciliationReport {
        let started_at = Utc::now() + Duration::minutes(offset_minutes);
        ReconciliationReport {
            run_id: run_id.to_string(),
            started_at,
            finished_at: started_at + Duration::seconds(3),
            supplier_count: 120,
            sheet_count: 80,
            matched: 70,
            price_changes: 4,
            marked_unavailable: 2,
            marked_available: 1,
            rows_flagged: 6,
            rows_written: 5,
            rows_skipped: 1,
            write_failures: vec!["write-back failed for row 9: quota".to_string()],
            changes: Vec::new(),
            new_entries: vec![AuditLogEntry {
                numeric_key: 4400,
                name: "Torch".to_string(),
                price: 15.0,
                addition_marker: "-".to_string(),
            }],
            audit_log_size: 10,
            snapshot_fingerprint: fingerprint.to_string(),
        }
    }

    #[test]
    fn test_record_and_list_runs() {
        let conn = Connection::open_in_memory().unwrap();
        setup_journal(&conn).unwrap();

        record_run(&conn, &create_test_report("run-1", 0, "aaa")).unwrap();
        record_run(&conn, &create_test_report("run-2", 5, "bbb")).unwrap();

        assert_eq!(count_runs(&conn).unwrap(), 2);

        let runs = recent_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "run-2");
        assert_eq!(runs[0].rows_written, 5);
        assert_eq!(runs[0].new_entries, 1);

        assert_eq!(recent_runs(&conn, 1).unwrap().len(), 1);
        assert_eq!(last_fingerprint(&conn).unwrap(), Some("bbb".to_string()));

        println!("✅ Run journal test PASSED");
    }

    #[test]
    fn test_empty_journal_has_no_fingerprint() {
        let conn = Connection::open_in_memory().unwrap();
        setup_journal(&conn).unwrap();

        assert_eq!(last_fingerprint(&conn).unwrap(), None);
        assert!(recent_runs(&conn, 5).unwrap().is_empty());
    }

    #[test]
    fn test_run_events() {
        let conn = Connection::open_in_memory().unwrap();
        setup_journal(&conn).unwrap();

        record_run(&conn, &create_test_report("run-1", 0, "aaa")).unwrap();

        let events = get_events_for_run(&conn, "run-1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "article_added");
        assert_eq!(events[0].data["numeric_key"], 4400);
        assert_eq!(events[1].event_type, "write_back_skipped");

        assert!(get_events_for_run(&conn, "other").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_run_id_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        setup_journal(&conn).unwrap();

        record_run(&conn, &create_test_report("run-1", 0, "aaa")).unwrap();
        assert!(record_run(&conn, &create_test_report("run-1", 1, "aaa")).is_err());
    }
}
