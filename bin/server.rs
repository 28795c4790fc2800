// Carteira - Web Server
// REST API with Axum

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use carteira::config::{DEFAULT_BIND_ADDR, DEFAULT_DB_PATH};
use carteira::ServerConfig;

#[derive(Parser)]
#[command(name = "carteira-server", version, about = "Carteira HTTP server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "CARTEIRA_ADDR", default_value = DEFAULT_BIND_ADDR)]
    bind: SocketAddr,

    /// Path to the SQLite database (created if missing)
    #[arg(long, env = "CARTEIRA_DB", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Directory served under /static
    #[arg(long, env = "CARTEIRA_STATIC", default_value = "static")]
    static_dir: PathBuf,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind,
            db_path: args.db,
            static_dir: args.static_dir,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = ServerConfig::from(Args::parse());
    carteira::api::serve(config).await
}
