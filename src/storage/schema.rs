//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS politicians (
            id TEXT PRIMARY KEY,
            full_title TEXT NOT NULL UNIQUE,
            prefix TEXT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            suffix TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS disclosure_reports (
            id TEXT PRIMARY KEY,
            doc_id TEXT NOT NULL UNIQUE,
            politician_id TEXT NOT NULL,
            filing_type TEXT NOT NULL,
            state_district TEXT NOT NULL,
            year TEXT NOT NULL,
            filing_date TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (politician_id) REFERENCES politicians(id)
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            report_id TEXT NOT NULL,
            asset TEXT NOT NULL,
            type TEXT NOT NULL,
            date TEXT NOT NULL,
            trade_date TEXT,
            notification_date TEXT NOT NULL,
            amount TEXT NOT NULL,
            capital_gains INTEGER NOT NULL DEFAULT 0,
            owner TEXT,
            details TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (report_id) REFERENCES disclosure_reports(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_reports_politician ON disclosure_reports(politician_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_report ON transactions(report_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_trade_date ON transactions(trade_date);",
    )?;

    conn.execute("INSERT OR IGNORE INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        for table in ["politicians", "disclosure_reports", "transactions"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "{}", table);
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
