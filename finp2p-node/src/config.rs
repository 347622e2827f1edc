use std::collections::HashMap;
use std::fs;

use finp2p_common::error::FinP2PError;
use finp2p_common::Result;
use serde::{Deserialize, Serialize};

/// Ledger types a `LedgerConfig.type` may name (spec §6.1).
const KNOWN_LEDGER_TYPES: &[&str] = &["sui", "hedera", "mock", "aptos", "fabric"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub encryption_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub peers: Vec<String>,
    pub heartbeat_interval_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    pub max_concurrency: usize,
    pub batch_size: usize,
    pub processing_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(rename = "type")]
    pub ledger_type: String,
    pub config: serde_json::Value,
}

/// Router process configuration (spec §6.4). Every field enumerated in
/// §6.4 is represented; `validate()` checks all of them before any
/// subsystem starts, returning the first violation rather than panicking
/// (spec: "Invalid configuration MUST fail startup deterministically"),
/// following `atlas_node::config::Config::load_from_file`'s
/// serde_json-backed load pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub router_id: String,
    pub host: String,
    pub port: u32,
    pub redis: RedisConfig,
    pub security: SecurityConfig,
    pub monitoring: MonitoringConfig,
    pub ledgers: HashMap<String, LedgerConfig>,
    pub network: NetworkConfig,
    pub reservation_timeout_ms: u64,
    pub confirmation: ConfirmationConfig,
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| FinP2PError::Config(format!("failed to read config file {path}: {e}")))?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| FinP2PError::Config(format!("failed to parse config file {path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).map_err(|e| FinP2PError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, raw).map_err(|e| FinP2PError::Config(format!("failed to write config file {path}: {e}")))
    }

    /// Every check enumerated in spec §6.4. Fails on the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.router_id.trim().is_empty() {
            return Err(FinP2PError::Config("routerId must not be empty".into()));
        }
        if self.port > 65535 {
            return Err(FinP2PError::Config(format!("port out of range: {}", self.port)));
        }
        if self.host.trim().is_empty() {
            return Err(FinP2PError::Config("host must not be empty".into()));
        }
        if self.redis.url.trim().is_empty() {
            return Err(FinP2PError::Config("redis.url must not be empty".into()));
        }
        if self.security.encryption_key.len() < 32 {
            return Err(FinP2PError::Config("security.encryptionKey must be at least 32 characters".into()));
        }
        if self.monitoring.log_level.trim().is_empty() {
            return Err(FinP2PError::Config("monitoring.logLevel must not be empty".into()));
        }
        for (ledger_id, ledger) in &self.ledgers {
            if !KNOWN_LEDGER_TYPES.contains(&ledger.ledger_type.as_str()) {
                return Err(FinP2PError::Config(format!("ledgers.{ledger_id}.type is not a known ledger type: {}", ledger.ledger_type)));
            }
        }
        for peer in &self.network.peers {
            if !peer.contains("://") {
                return Err(FinP2PError::Config(format!("network.peers entry is not a URL: {peer}")));
            }
        }
        if self.network.heartbeat_interval_ms == 0 {
            return Err(FinP2PError::Config("network.heartbeatInterval must be > 0".into()));
        }
        if self.network.timeout_ms == 0 {
            return Err(FinP2PError::Config("network.timeout must be > 0".into()));
        }
        if self.reservation_timeout_ms == 0 {
            return Err(FinP2PError::Config("reservationTimeout must be > 0".into()));
        }
        if self.confirmation.max_concurrency == 0 {
            return Err(FinP2PError::Config("confirmation.maxConcurrency must be > 0".into()));
        }
        if self.confirmation.batch_size == 0 {
            return Err(FinP2PError::Config("confirmation.batchSize must be > 0".into()));
        }
        if self.confirmation.processing_timeout_ms == 0 {
            return Err(FinP2PError::Config("confirmation.processingTimeout must be > 0".into()));
        }
        Ok(())
    }
}
