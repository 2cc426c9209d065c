use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use super::types::{ConnectivityConfig, ExchangeConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("No enabled exchanges in config")]
    NoExchanges,
    #[error("Exchange not found: {0}")]
    UnknownExchange(String),
}

/// Load connectivity configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ConnectivityConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<ConnectivityConfig, ConfigError> {
    let config: ConnectivityConfig = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the embedded configuration (local FIX simulator)
pub fn load_default_config() -> Result<ConnectivityConfig, ConfigError> {
    load_config_from_str(include_str!("connectivity.json"))
}

impl ConnectivityConfig {
    pub fn enabled_exchanges(&self) -> Vec<&ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled).collect()
    }

    /// Look up an exchange by id (case-insensitive, like `ExchangeId`)
    pub fn get_exchange(&self, id: &str) -> Result<&ExchangeConfig, ConfigError> {
        self.exchanges
            .iter()
            .find(|e| e.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| ConfigError::UnknownExchange(id.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let enabled = self.enabled_exchanges();
        if enabled.is_empty() {
            return Err(ConfigError::NoExchanges);
        }

        let mut seen = HashSet::new();
        for exchange in enabled {
            if !seen.insert(exchange.exchange_id()) {
                log::warn!(
                    "Exchange {} is configured more than once; the last entry wins",
                    exchange.id
                );
            }
        }
        Ok(())
    }
}
