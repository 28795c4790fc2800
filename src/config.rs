use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_DB_PATH: &str = "carteira.db";

/// Server settings; the binaries fill these from flags / environment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    /// Served under /static
    pub static_dir: PathBuf,
    /// File name offered by GET /download-db
    pub download_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            static_dir: PathBuf::from("static"),
            download_name: DEFAULT_DB_PATH.to_string(),
        }
    }
}
