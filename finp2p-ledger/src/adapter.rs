use std::time::Duration;

use async_trait::async_trait;
use finp2p_common::{Account, Asset, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Input to `LedgerAdapter::create_asset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSpec {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub total_supply: u128,
    pub institution_id: String,
    pub contract_address: Option<String>,
}

/// Confirmation status of a ledger-native transaction (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub tx_hash: String,
    pub account: String,
    pub asset: String,
    pub amount: u128,
    pub status: TransactionStatus,
    pub timestamp: u64,
}

/// Required confirmation depth/age before a lock transaction is treated as
/// finalized (spec §9 open question: adapters must define their own
/// finality policy; this crate does not prescribe a universal threshold).
#[derive(Debug, Clone, Copy)]
pub struct FinalityPolicy {
    pub confirmations: u32,
    pub min_age: Duration,
}

/// Events an adapter emits so the transfer state machine (C6) can react
/// without polling (spec §4.1: "adapters MUST emit events for
/// `AssetLocked` and terminal transaction states").
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    AssetLocked { tx_hash: String, account: String, asset: String, amount: u128 },
    TransactionConfirmed { tx_hash: String },
    TransactionFailed { tx_hash: String, reason: String },
}

/// Uniform capability set over one ledger (spec §4.1, component C1).
///
/// `available = balance − locked`; adapters without a native freeze
/// primitive return `locked = 0` and therefore `available == balance`.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Typed ledger identifier (`sui`, `hedera`, `mock`, ...).
    fn ledger_id(&self) -> &str;

    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn is_connected(&self) -> bool;

    async fn create_asset(&self, spec: AssetSpec) -> Result<Asset>;
    async fn get_asset(&self, asset_id: &str) -> Result<Option<Asset>>;

    async fn create_account(&self, institution_id: &str) -> Result<Account>;
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>>;

    async fn get_balance(&self, account: &str, asset: &str) -> Result<u128>;
    async fn get_available(&self, account: &str, asset: &str) -> Result<u128>;
    async fn get_locked(&self, account: &str, asset: &str) -> Result<u128>;

    /// Single-ledger move; the adapter guarantees atomicity at the ledger
    /// level.
    async fn transfer(&self, from: &str, to: &str, asset: &str, amount: u128) -> Result<String>;

    /// Promotes `amount` from available to locked. On ledgers without a
    /// native freeze primitive the adapter emulates this via an on-chain
    /// custody primitive; behavior is observable only through
    /// `get_locked`.
    async fn lock_asset(&self, account: &str, asset: &str, amount: u128) -> Result<String>;
    async fn unlock_asset(&self, account: &str, asset: &str, amount: u128) -> Result<String>;

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<LedgerTransaction>>;
    async fn get_transaction_status(&self, tx_hash: &str) -> Result<TransactionStatus>;

    fn finality_policy(&self) -> FinalityPolicy;

    /// Subscribes to this adapter's event stream. Implementations that
    /// cannot produce push events may return an empty, immediately-closed
    /// channel; callers MUST fall back to polling `get_transaction_status`
    /// in that case.
    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent>;
}
