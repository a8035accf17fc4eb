//! Ledger engine configuration.

/// Limits enforced by the ledger engine.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Maximum number of currency legs on one debt.
    pub max_debt_legs: usize,
    /// Maximum length of free-text details, in characters.
    pub max_details_len: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_debt_legs: 8,
            max_details_len: 1024,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(legs) = std::env::var("LEDGER_MAX_DEBT_LEGS") {
            if let Ok(legs) = legs.parse() {
                config.max_debt_legs = legs;
            }
        }

        if let Ok(len) = std::env::var("LEDGER_MAX_DETAILS_LEN") {
            if let Ok(len) = len.parse() {
                config.max_details_len = len;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_debt_legs == 0 {
            return Err("Max debt legs cannot be 0".to_string());
        }

        if self.max_details_len == 0 {
            return Err("Max details length cannot be 0".to_string());
        }

        Ok(())
    }
}
