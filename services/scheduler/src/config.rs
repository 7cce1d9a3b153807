//! Configuration for the uninstall scheduler.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Service name. Namespace for all persisted state and the secrets
    /// namespace to purge.
    pub service_name: String,

    /// Whether this scheduler variant is enabled at all. Teardown is
    /// destructive, so it is opt-in per deployment.
    pub uninstall_enabled: bool,

    /// Address to listen on for the operator HTTP surface.
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// SQLite path for the persistent store. `None` keeps state in memory.
    pub state_db: Option<PathBuf>,

    /// Whether we're in development mode (uses the loopback mock driver).
    pub dev_mode: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let service_name =
            std::env::var("BERTH_SERVICE_NAME").unwrap_or_else(|_| "berth-service".to_string());

        let uninstall_enabled = flag("BERTH_UNINSTALL");

        let listen_addr = std::env::var("BERTH_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = std::env::var("BERTH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let state_db = std::env::var("BERTH_STATE_DB").ok().map(PathBuf::from);

        let dev_mode = flag("BERTH_DEV");

        Ok(Self {
            service_name,
            uninstall_enabled,
            listen_addr,
            log_level,
            state_db,
            dev_mode,
        })
    }
}

fn flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}
