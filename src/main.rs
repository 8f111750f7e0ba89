use anyhow::{bail, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use stock_sync::{
    last_fingerprint, open_journal, recent_runs, record_run, CsvSheet, CsvSupplierProvider,
    KeyNormalizer, LogObserver, ReconciliationEngine, SyncConfig, SyncError, XlsxAuditLog,
};

const DEFAULT_CONFIG: &str = "sync.json";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("sync") | None => run_sync(args.get(2).map(String::as_str))?,
        Some("history") => run_history(args.get(2).map(String::as_str))?,
        Some("check-key") => match args.get(2) {
            Some(code) => run_check_key(code, args.get(3).map(String::as_str))?,
            None => bail!("usage: stock-sync check-key <code> [config.json]"),
        },
        Some(other) => {
            eprintln!("❌ Unknown command: {}", other);
            eprintln!("   Usage: stock-sync [sync|history|check-key] [config.json]");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> Result<SyncConfig> {
    let path = Path::new(path.unwrap_or(DEFAULT_CONFIG));
    if path.exists() {
        SyncConfig::from_file(path)
    } else {
        println!("⚠️  {} not found, using defaults", path.display());
        Ok(SyncConfig::default())
    }
}

fn run_sync(config_path: Option<&str>) -> Result<()> {
    println!("🔄 Stock Sync {} - supplier ↔ shared sheet", stock_sync::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = load_config(config_path)?;

    // 1. Open collaborators
    println!("\n📂 Opening data sources...");
    let mut supplier = CsvSupplierProvider::from_config(&config);
    let mut sheet = CsvSheet::open(&config)
        .map_err(|e| SyncError::provider_unavailable("shared sheet", format!("{:#}", e)))?;
    let mut audit_log = XlsxAuditLog::from_config(&config);
    let journal = open_journal(&config.journal.path)?;
    println!("✓ Sheet:    {}", config.sheet.path.display());
    println!("✓ Supplier: {}", supplier.path().display());
    println!("✓ Audit:    {}", audit_log.path().display());

    // 2. Reconcile
    println!("\n⚖️  Reconciling...");
    let engine = ReconciliationEngine::from_config(&config);
    let report = engine.run_pass(&mut supplier, &mut sheet, &mut audit_log, &mut LogObserver)?;

    // 3. Journal
    let previous = last_fingerprint(&journal)?;
    record_run(&journal, &report)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Matched rows:        {}", report.matched);
    println!("✓ Price updates:       {}", report.price_changes);
    println!("✓ Marked unavailable:  {}", report.marked_unavailable);
    println!("✓ Marked available:    {}", report.marked_available);
    println!("✓ Rows written:        {}", report.rows_written);
    println!("✓ New audit entries:   {}", report.new_entries.len());
    if previous.as_deref() == Some(report.snapshot_fingerprint.as_str()) {
        println!("ℹ️  Supplier snapshot unchanged since the last run");
    }

    if report.is_clean() {
        println!("✅ Sync complete");
    } else {
        println!("⚠️  Sync complete, {} rows skipped:", report.rows_skipped);
        for failure in &report.write_failures {
            println!("   - {}", failure);
        }
    }

    Ok(())
}

fn run_history(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let journal = open_journal(&config.journal.path)?;
    let runs = recent_runs(&journal, 20)?;

    if runs.is_empty() {
        println!("No runs journaled yet.");
        return Ok(());
    }

    println!("📜 Last {} runs", runs.len());
    for run in runs {
        println!(
            "{}  {}  supplier={} sheet={} written={} skipped={} new={}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.run_id,
            run.supplier_count,
            run.sheet_count,
            run.rows_written,
            run.rows_skipped,
            run.new_entries
        );
    }

    Ok(())
}

fn run_check_key(code: &str, config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let normalizer = KeyNormalizer::from_config(&config);

    match normalizer.parse(code) {
        Ok(key) => println!("✓ {} → {}", code, key),
        Err(e) => {
            println!("✗ {}", e);
            if let Some(rest) = normalizer.remainder(code) {
                println!("  remainder after prefix: {:?}", rest);
            }
        }
    }

    Ok(())
}
