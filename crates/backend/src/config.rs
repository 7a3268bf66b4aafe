// =============================================================================
// Riparian API - Configuration
// =============================================================================

use clap::Parser;
use std::path::PathBuf;

/// Server configuration from flags, falling back to environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "riparian-api", about = "Riparian buffer dashboard API server")]
pub struct Config {
    /// Server bind address (e.g., "127.0.0.1:7000")
    #[arg(long = "bind", env = "BIND_ADDRESS", default_value = "127.0.0.1:7000")]
    pub bind_address: String,

    /// Path to the project's risk.toml
    #[arg(long = "config", env = "RISK_CONFIG", default_value = "config/risk.toml")]
    pub risk_config: PathBuf,

    /// Allowed CORS origin; any origin when unset
    #[arg(long, env = "FRONTEND_URL")]
    pub frontend_url: Option<String>,

    /// Sessions unused for this many minutes are dropped
    #[arg(long, env = "SESSION_IDLE_MINUTES", default_value_t = 720)]
    pub session_idle_minutes: i64,
}

impl Config {
    /// Parse flags, reading `.env` first so its values act as env defaults.
    pub fn load() -> Self {
        // Try current directory first, then crates/backend/
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("crates/backend/.env");
        }
        Self::parse()
    }
}
