//! Node configuration.

use cashdesk_ledger::LedgerConfig;

/// Main node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Connection pool size.
    pub max_connections: u32,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Ledger engine limits.
    pub ledger: LedgerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/cashdesk".to_string(),
            max_connections: 10,
            log_level: "info".to_string(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(max) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse() {
                config.max_connections = max;
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config.ledger = LedgerConfig::from_env();
        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("Max connections cannot be 0".to_string());
        }

        self.ledger.validate()
    }
}
