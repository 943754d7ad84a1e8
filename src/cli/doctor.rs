//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use medrem::config::MedremConfig;
use medrem::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &MedremConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `medrem add` or `medrem serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn)
        .context("failed to run health check")?;

    println!("medrem Health Report");
    println!("====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("Notification sink: {}", config.notification.sink);
    println!();
    println!("Row counts:");
    println!("  Medicines:       {}", report.medicine_count);
    println!("  Users:           {}", report.user_count);
    println!("  Notifications:   {}", report.notification_count);
    println!();
    println!("Reminders:");
    println!("  Active:          {}", report.active_work_count);
    println!("  Failed:          {}", report.failed_work_count);
    if report.failed_work_count > 0 {
        println!("  Run `medrem resync --all` to re-register failed reminders.");
    }
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Stop `medrem serve`");
        println!("  2. Restore from a backup: cp backup.db ~/.medrem/medrem.db");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
