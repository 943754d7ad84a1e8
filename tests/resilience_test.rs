mod helpers;

use medrem::db;
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    // Should not exist yet
    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();

    // Should have been created
    assert!(db_path.exists());

    // Should be functional
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM medicines", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn health_check_passes_on_valid_db() {
    let conn = helpers::test_db();

    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert_eq!(report.medicine_count, 0);
    assert_eq!(report.active_work_count, 0);
    assert_eq!(report.notification_count, 0);
}

#[test]
fn health_check_counts_users_and_medicines() {
    let conn = helpers::test_db();
    helpers::insert_medicine(&conn, "alice", "Aspirin", &[helpers::t(8, 0)]);
    helpers::insert_medicine(&conn, "alice", "Vitamin D", &[helpers::t(9, 0)]);
    helpers::insert_medicine(&conn, "bob", "Ibuprofen", &[helpers::t(12, 0)]);

    let report = db::check_database_health(&conn).unwrap();
    assert_eq!(report.medicine_count, 3);
    assert_eq!(report.user_count, 2);
}

#[test]
fn busy_timeout_is_set() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("test.db");

    let conn = db::open_database(&db_path).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn data_persists_across_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("medrem.db");

    {
        let conn = db::open_database(&db_path).unwrap();
        helpers::insert_medicine(&conn, "alice", "Aspirin", &[helpers::t(8, 0)]);
    }

    let conn = db::open_database(&db_path).unwrap();
    let medicines = medrem::medicine::store::list_medicines(&conn, "alice").unwrap();
    assert_eq!(medicines.len(), 1);
    assert_eq!(medicines[0].name, "Aspirin");
}
