use std::io::Write;

use crate::db::Expense;
use crate::error::LedgerResult;
use crate::ledger::Ledger;

/// Write expenses as CSV (header: id,categoria,valor,data), newest first.
/// Returns the number of rows written.
pub fn write_expenses_csv<W: Write>(expenses: &[Expense], writer: W) -> csv::Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for expense in expenses {
        csv_writer.serialize(expense)?;
    }

    csv_writer.flush()?;
    Ok(expenses.len())
}

/// Export the ledger's current expense list
pub fn export_ledger_csv<W: Write>(ledger: &Ledger, writer: W) -> LedgerResult<usize> {
    let state = ledger.get_state()?;
    let count = write_expenses_csv(&state.expenses, writer)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(count)
}
