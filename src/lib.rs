// Carteira - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ledger;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::ServerConfig;
pub use db::{Expense, LedgerEvent, TIMESTAMP_FORMAT};
pub use error::{LedgerError, LedgerResult};
pub use export::{export_ledger_csv, write_expenses_csv};
pub use ledger::{Ledger, LedgerState, RecordedExpense};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
