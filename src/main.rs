use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io;
use std::path::PathBuf;

use carteira::{config::DEFAULT_DB_PATH, export_ledger_csv, Ledger};

#[derive(Parser)]
#[command(name = "carteira", version, about = "Personal balance and expense tracker")]
struct Cli {
    /// Path to the SQLite database (created if missing)
    #[arg(long, global = true, env = "CARTEIRA_DB", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the balance and every expense, newest first
    State,
    /// Add funds to the balance
    Deposit { amount: f64 },
    /// Record an expense
    Expense { categoria: String, valor: f64 },
    /// Delete an expense and refund its value
    Delete { id: i64 },
    /// Show the audit trail
    Events,
    /// Write expenses as CSV
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let ledger = Ledger::open(&cli.db)
        .with_context(|| format!("Failed to open database at {}", cli.db.display()))?;

    match cli.command {
        Command::State => {
            let state = ledger.get_state()?;
            println!("Saldo: {:.2}", state.balance);
            if state.expenses.is_empty() {
                println!("Nenhum gasto registrado.");
            }
            for expense in &state.expenses {
                println!(
                    "#{:<5} {}  {:<20} {:>10.2}",
                    expense.id, expense.created_at, expense.category, expense.value
                );
            }
        }
        Command::Deposit { amount } => {
            let balance = ledger.add_funds(amount)?;
            println!("✓ Saldo: {:.2}", balance);
        }
        Command::Expense { categoria, valor } => {
            let recorded = ledger.add_expense(&categoria, valor)?;
            println!(
                "✓ Gasto #{} registrado em {} - saldo: {:.2}",
                recorded.id, recorded.created_at, recorded.balance
            );
        }
        Command::Delete { id } => {
            let balance = ledger.delete_expense(id)?;
            println!("✓ Gasto #{} removido - saldo: {:.2}", id, balance);
        }
        Command::Events => {
            for event in ledger.events()? {
                println!(
                    "{}  {:<16} saldo {:>10.2}  {}",
                    event.timestamp.to_rfc3339(),
                    event.event_type,
                    event.balance,
                    event.data
                );
            }
        }
        Command::Export { output } => {
            let count = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    export_ledger_csv(&ledger, file)?
                }
                None => export_ledger_csv(&ledger, io::stdout().lock())?,
            };
            eprintln!("✓ Exported {} expenses", count);
        }
    }

    Ok(())
}
