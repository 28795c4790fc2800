use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Format of the `data` column on expenses (local time).
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// One recorded outflow.
/// Field names on the wire follow the stored columns (`categoria`, `valor`, `data`).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Expense {
    pub id: i64,

    #[serde(rename = "categoria")]
    pub category: String,

    #[serde(rename = "valor")]
    pub value: f64,

    /// Creation time, formatted with [`TIMESTAMP_FORMAT`]
    #[serde(rename = "data")]
    pub created_at: String,
}

/// Audit trail entry: every balance mutation is an event
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub data: serde_json::Value,
    /// Balance right after the mutation was applied
    pub balance: f64,
}

impl LedgerEvent {
    pub fn new(event_type: &str, data: serde_json::Value, balance: f64) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            data,
            balance,
        }
    }
}

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Balance: exactly one row, id = 1
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS balance (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            amount REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO balance (id, amount) VALUES (1, 0.0)",
        [],
    )?;

    // ==========================================================================
    // Expenses (AUTOINCREMENT so deleted ids are never handed out again)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS gastos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            categoria TEXT NOT NULL,
            valor REAL NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            data TEXT NOT NULL,
            balance REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type)",
        [],
    )?;

    Ok(())
}

pub fn read_balance(conn: &Connection) -> rusqlite::Result<f64> {
    conn.query_row("SELECT amount FROM balance WHERE id = 1", [], |row| row.get(0))
}

/// Add `delta` (may be negative) to the balance row
pub fn apply_balance_delta(conn: &Connection, delta: f64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE balance SET amount = amount + ?1 WHERE id = 1",
        params![delta],
    )?;
    Ok(())
}

/// Insert an expense row and return its assigned id
pub fn insert_expense(
    conn: &Connection,
    category: &str,
    value: f64,
    created_at: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO gastos (categoria, valor, data) VALUES (?1, ?2, ?3)",
        params![category, value, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_expense(conn: &Connection, id: i64) -> rusqlite::Result<Option<Expense>> {
    conn.query_row(
        "SELECT id, categoria, valor, data FROM gastos WHERE id = ?1",
        params![id],
        |row| {
            Ok(Expense {
                id: row.get(0)?,
                category: row.get(1)?,
                value: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
}

/// Returns the number of rows removed (0 or 1)
pub fn remove_expense(conn: &Connection, id: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM gastos WHERE id = ?1", params![id])
}

/// All expenses, newest first
pub fn list_expenses(conn: &Connection) -> rusqlite::Result<Vec<Expense>> {
    let mut stmt = conn.prepare(
        "SELECT id, categoria, valor, data
         FROM gastos
         ORDER BY id DESC",
    )?;

    let expenses = stmt
        .query_map([], |row| {
            Ok(Expense {
                id: row.get(0)?,
                category: row.get(1)?,
                value: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(expenses)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &LedgerEvent) -> Result<(), crate::LedgerError> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, data, balance
        ) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            data_json,
            event.balance,
        ],
    )?;

    Ok(())
}

/// Audit trail, newest first
pub fn list_events(conn: &Connection) -> rusqlite::Result<Vec<LedgerEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, data, balance
         FROM events
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map([], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(3)?;

            Ok(LedgerEvent {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
                balance: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Write a consistent copy of the whole database to `dest`.
/// Includes pages still sitting in the WAL; `dest` must not exist yet.
pub fn snapshot_into(conn: &Connection, dest: &Path) -> rusqlite::Result<()> {
    let dest = dest.to_string_lossy().into_owned();
    conn.execute("VACUUM INTO ?1", params![dest])?;
    Ok(())
}
