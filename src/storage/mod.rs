//! SQLite storage layer -- schema, migrations, disclosure records.

pub mod schema;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::disclosure::{Disclosure, DisclosureRepository, Transaction};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("opening database {}", path.display()))?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// [`DisclosureRepository`] over the pooled SQLite database.
#[derive(Clone)]
pub struct SqliteDisclosureRepository {
    pool: Pool,
}

impl SqliteDisclosureRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(open_pool(path)?))
    }

    /// Number of transactions per asset traded within `[start, end]`.
    /// Transactions whose date could not be read are left out.
    pub fn transaction_volumes(&self, start: NaiveDate, end: NaiveDate) -> Result<BTreeMap<String, i64>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT asset, COUNT(*) FROM transactions
             WHERE trade_date BETWEEN ?1 AND ?2
             GROUP BY asset",
        )?;
        let rows = stmt.query_map(params![start.to_string(), end.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let volumes = rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        debug!(%start, %end, assets = volumes.len(), "computed transaction volumes");
        Ok(volumes)
    }

    /// Stored transactions of the report with `doc_id`, in insertion order.
    pub fn transactions_for(&self, doc_id: &str) -> Result<Vec<Transaction>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT t.asset, t.type, t.date, t.notification_date, t.amount,
                    t.capital_gains, t.owner, t.details
             FROM transactions t
             JOIN disclosure_reports r ON r.id = t.report_id
             WHERE r.doc_id = ?1
             ORDER BY t.rowid",
        )?;
        let rows = stmt.query_map([doc_id], |row| {
            Ok(Transaction {
                asset: row.get(0)?,
                kind: row.get(1)?,
                date: row.get(2)?,
                notification_date: row.get(3)?,
                amount: row.get(4)?,
                capital_gains: row.get(5)?,
                owner: row.get(6)?,
                details: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Filing dates come back from the model in a few spellings; store them
/// as ISO dates so they can be range-queried.
fn parse_trade_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%m/%d/%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

impl DisclosureRepository for SqliteDisclosureRepository {
    fn report_exists(&self, doc_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM disclosure_reports WHERE doc_id = ?1",
                [doc_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn save_report(&self, d: &Disclosure, transactions: &[Transaction]) -> Result<String> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let full_title = d.full_title();
        let politician_id: String = match tx
            .query_row(
                "SELECT id FROM politicians WHERE full_title = ?1",
                [&full_title],
                |row| row.get(0),
            )
            .optional()?
        {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO politicians (id, full_title, prefix, first_name, last_name, suffix)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![id, full_title, d.prefix, d.first, d.last, d.suffix],
                )?;
                id
            }
        };

        let report_id = uuid::Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO disclosure_reports
                (id, doc_id, politician_id, filing_type, state_district, year, filing_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report_id,
                d.doc_id,
                politician_id,
                d.filing_type,
                d.state_district,
                d.year,
                d.filing_date
            ],
        )
        .with_context(|| format!("inserting report {}", d.doc_id))?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO transactions
                    (id, report_id, asset, type, date, trade_date, notification_date, amount,
                     capital_gains, owner, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for t in transactions {
                insert.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    report_id,
                    t.asset,
                    t.kind,
                    t.date,
                    parse_trade_date(&t.date).map(|d| d.to_string()),
                    t.notification_date,
                    t.amount,
                    t.capital_gains,
                    t.owner,
                    t.details
                ])?;
            }
        }

        tx.commit()?;
        debug!(doc_id = %d.doc_id, %report_id, count = transactions.len(), "saved report");
        Ok(report_id)
    }
}
