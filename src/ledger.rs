// Ledger - balance and expenses kept consistent
// balance = sum(deposits) - sum(active expense values), starting from zero

use chrono::Local;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::db::{self, Expense, LedgerEvent, TIMESTAMP_FORMAT};
use crate::error::{LedgerError, LedgerResult};

pub const INVALID_AMOUNT: &str = "Valor inválido";
pub const INVALID_EXPENSE: &str = "Dados inválidos";

/// Balance plus expense history, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    pub balance: f64,
    #[serde(rename = "gastos")]
    pub expenses: Vec<Expense>,
}

/// Result of recording a new expense
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedExpense {
    pub id: i64,
    pub balance: f64,
    #[serde(rename = "data")]
    pub created_at: String,
}

/// Owner of the balance row and the expense table.
///
/// Every mutation takes the connection lock and runs inside one immediate
/// SQLite transaction, so the read-modify-write on the balance never
/// interleaves with another writer.
pub struct Ledger {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Ledger {
    /// Open the ledger stored at `path`, creating the file and schema if needed
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        db::setup_database(&conn)?;
        tracing::debug!(path = %path.display(), "ledger opened");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        db::setup_database(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Backing file, `None` for in-memory ledgers
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get_state(&self) -> LedgerResult<LedgerState> {
        let conn = self.lock();
        let balance = db::read_balance(&conn)?;
        let expenses = db::list_expenses(&conn)?;

        Ok(LedgerState { balance, expenses })
    }

    pub fn balance(&self) -> LedgerResult<f64> {
        let conn = self.lock();
        Ok(db::read_balance(&conn)?)
    }

    /// Deposit: balance += amount
    pub fn add_funds(&self, amount: f64) -> LedgerResult<f64> {
        if !is_positive(amount) {
            return Err(LedgerError::InvalidInput(INVALID_AMOUNT.to_string()));
        }

        let balance = self.write(|tx| {
            db::apply_balance_delta(tx, amount)?;
            let balance = db::read_balance(tx)?;
            db::insert_event(
                tx,
                &LedgerEvent::new("deposit", json!({ "amount": amount }), balance),
            )?;
            Ok(balance)
        })?;

        tracing::info!(amount, balance, "funds added");
        Ok(balance)
    }

    /// Record an expense stamped with the current local time: balance -= value
    pub fn add_expense(&self, category: &str, value: f64) -> LedgerResult<RecordedExpense> {
        let category = category.trim();
        if category.is_empty() || !is_positive(value) {
            return Err(LedgerError::InvalidInput(INVALID_EXPENSE.to_string()));
        }

        let created_at = Local::now().format(TIMESTAMP_FORMAT).to_string();

        let recorded = self.write(|tx| {
            let id = db::insert_expense(tx, category, value, &created_at)?;
            db::apply_balance_delta(tx, -value)?;
            let balance = db::read_balance(tx)?;
            db::insert_event(
                tx,
                &LedgerEvent::new(
                    "expense_added",
                    json!({ "id": id, "categoria": category, "valor": value }),
                    balance,
                ),
            )?;
            Ok(RecordedExpense {
                id,
                balance,
                created_at: created_at.clone(),
            })
        })?;

        tracing::info!(
            id = recorded.id,
            category,
            value,
            balance = recorded.balance,
            "expense added"
        );
        Ok(recorded)
    }

    /// Remove an expense and refund its value: balance += value
    pub fn delete_expense(&self, id: i64) -> LedgerResult<f64> {
        let balance = self.write(|tx| {
            let expense = db::find_expense(tx, id)?.ok_or(LedgerError::NotFound(id))?;

            db::remove_expense(tx, id)?;
            db::apply_balance_delta(tx, expense.value)?;
            let balance = db::read_balance(tx)?;
            db::insert_event(
                tx,
                &LedgerEvent::new(
                    "expense_deleted",
                    json!({
                        "id": id,
                        "categoria": expense.category,
                        "valor": expense.value,
                    }),
                    balance,
                ),
            )?;
            Ok(balance)
        })?;

        tracing::info!(id, balance, "expense deleted");
        Ok(balance)
    }

    /// Audit trail, newest first
    pub fn events(&self) -> LedgerResult<Vec<LedgerEvent>> {
        let conn = self.lock();
        Ok(db::list_events(&conn)?)
    }

    /// Copy the whole database to `dest` (which must not exist yet)
    pub fn snapshot_to(&self, dest: &Path) -> LedgerResult<()> {
        let conn = self.lock();
        db::snapshot_into(&conn, dest)?;
        Ok(())
    }

    /// Consistent copy of the database file, as bytes
    pub fn snapshot_bytes(&self) -> LedgerResult<Vec<u8>> {
        let tmp = std::env::temp_dir().join(format!("carteira-{}.db", uuid::Uuid::new_v4()));

        self.snapshot_to(&tmp)?;
        let bytes = std::fs::read(&tmp);
        if let Err(e) = std::fs::remove_file(&tmp) {
            tracing::warn!(path = %tmp.display(), error = %e, "failed to remove snapshot file");
        }

        Ok(bytes?)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-operation leaves no open transaction behind (it is rolled
        // back on drop), so the connection is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write<T>(&self, op: impl FnOnce(&Transaction<'_>) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = op(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn is_positive(amount: f64) -> bool {
    amount.is_finite() && amount > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use std::sync::Arc;

    fn ledger() -> Ledger {
        Ledger::open_in_memory().unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_deposit_expense_delete_scenario() {
        let ledger = ledger();
        assert_eq!(ledger.balance().unwrap(), 0.0);

        assert_eq!(ledger.add_funds(100.0).unwrap(), 100.0);

        let recorded = ledger.add_expense("food", 30.0).unwrap();
        assert_eq!(recorded.id, 1);
        assert_eq!(recorded.balance, 70.0);

        assert_eq!(ledger.delete_expense(1).unwrap(), 100.0);
        assert!(ledger.get_state().unwrap().expenses.is_empty());
    }

    #[test]
    fn test_balance_invariant_over_mixed_operations() {
        let ledger = ledger();
        let mut deposits = 0.0;
        let mut active: Vec<(i64, f64)> = Vec::new();

        // Small LCG so the sequence is deterministic
        let mut seed: u64 = 0x2545_f491;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u32
        };

        for _ in 0..200 {
            match next() % 3 {
                0 => {
                    let amount = f64::from(next() % 10_000) / 100.0 + 0.01;
                    ledger.add_funds(amount).unwrap();
                    deposits += amount;
                }
                1 => {
                    let value = f64::from(next() % 5_000) / 100.0 + 0.01;
                    let recorded = ledger.add_expense("misc", value).unwrap();
                    active.push((recorded.id, value));
                }
                _ => {
                    if !active.is_empty() {
                        let idx = next() as usize % active.len();
                        let (id, _) = active.remove(idx);
                        ledger.delete_expense(id).unwrap();
                    }
                }
            }

            let expected = deposits - active.iter().map(|(_, v)| v).sum::<f64>();
            assert_close(ledger.balance().unwrap(), expected);
        }

        let state = ledger.get_state().unwrap();
        assert_eq!(state.expenses.len(), active.len());
    }

    #[test]
    fn test_invalid_deposit_leaves_state_untouched() {
        let ledger = ledger();
        ledger.add_funds(10.0).unwrap();

        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = ledger.add_funds(amount).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput(ref msg) if msg == INVALID_AMOUNT));
        }

        assert_eq!(ledger.balance().unwrap(), 10.0);
        assert_eq!(ledger.events().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_expense_leaves_state_untouched() {
        let ledger = ledger();
        ledger.add_funds(50.0).unwrap();

        let cases = [("", 10.0), ("   ", 10.0), ("food", 0.0), ("food", -1.0)];
        for (category, value) in cases {
            let err = ledger.add_expense(category, value).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput(ref msg) if msg == INVALID_EXPENSE));
        }

        let state = ledger.get_state().unwrap();
        assert_eq!(state.balance, 50.0);
        assert!(state.expenses.is_empty());
    }

    #[test]
    fn test_delete_unknown_id_is_not_found() {
        let ledger = ledger();
        ledger.add_funds(20.0).unwrap();
        ledger.add_expense("bus", 4.0).unwrap();

        let err = ledger.delete_expense(999).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(999)));

        let state = ledger.get_state().unwrap();
        assert_eq!(state.balance, 16.0);
        assert_eq!(state.expenses.len(), 1);
        assert_eq!(ledger.events().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_twice_is_not_found() {
        let ledger = ledger();
        let recorded = ledger.add_expense("rent", 300.0).unwrap();
        assert_eq!(ledger.delete_expense(recorded.id).unwrap(), 0.0);
        assert!(matches!(
            ledger.delete_expense(recorded.id),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_readding_deleted_expense_restores_balance() {
        let ledger = ledger();
        ledger.add_funds(80.0).unwrap();
        let first = ledger.add_expense("cinema", 25.5).unwrap();
        let before_delete = ledger.balance().unwrap();

        ledger.delete_expense(first.id).unwrap();
        let again = ledger.add_expense("cinema", 25.5).unwrap();

        assert_close(again.balance, before_delete);
        assert_ne!(again.id, first.id, "ids are never reused");
    }

    #[test]
    fn test_balance_may_go_negative() {
        let ledger = ledger();
        let recorded = ledger.add_expense("coffee", 3.5).unwrap();
        assert_eq!(recorded.balance, -3.5);
    }

    #[test]
    fn test_expense_category_is_trimmed_and_timestamped() {
        let ledger = ledger();
        let recorded = ledger.add_expense("  mercado ", 12.0).unwrap();

        let state = ledger.get_state().unwrap();
        assert_eq!(state.expenses[0].category, "mercado");
        assert_eq!(state.expenses[0].created_at, recorded.created_at);
        assert!(NaiveDateTime::parse_from_str(&recorded.created_at, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_state_lists_newest_first() {
        let ledger = ledger();
        let a = ledger.add_expense("a", 1.0).unwrap();
        let b = ledger.add_expense("b", 2.0).unwrap();
        let c = ledger.add_expense("c", 3.0).unwrap();

        let ids: Vec<i64> = ledger.get_state().unwrap().expenses.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
    }

    #[test]
    fn test_every_mutation_emits_one_event() {
        let ledger = ledger();
        ledger.add_funds(10.0).unwrap();
        let recorded = ledger.add_expense("lunch", 4.0).unwrap();
        ledger.delete_expense(recorded.id).unwrap();

        let events = ledger.events().unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["expense_deleted", "expense_added", "deposit"]);
        assert_eq!(events[0].balance, 10.0);
        assert_eq!(events[1].balance, 6.0);
        assert_eq!(events[1].data["categoria"], "lunch");
    }

    #[test]
    fn test_concurrent_deposits_are_serialized() {
        let ledger = Arc::new(ledger());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        ledger.add_funds(1.0).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.balance().unwrap(), 400.0);
        assert_eq!(ledger.events().unwrap().len(), 400);
    }

    #[test]
    fn test_state_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carteira.db");

        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.add_funds(100.0).unwrap();
            ledger.add_expense("gas", 40.0).unwrap();
            assert_eq!(ledger.path(), Some(path.as_path()));
        }

        let reopened = Ledger::open(&path).unwrap();
        let state = reopened.get_state().unwrap();
        assert_eq!(state.balance, 60.0);
        assert_eq!(state.expenses.len(), 1);
    }

    #[test]
    fn test_snapshot_bytes_is_sqlite_file() {
        let ledger = ledger();
        ledger.add_funds(5.0).unwrap();

        let bytes = ledger.snapshot_bytes().unwrap();
        assert!(bytes.starts_with(b"SQLite format 3\0"));
    }
}
