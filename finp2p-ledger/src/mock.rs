use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use finp2p_common::error::FinP2PError;
use finp2p_common::identity::{FinId, FinIdKind};
use finp2p_common::{Account, Asset, Result};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::adapter::{AssetSpec, FinalityPolicy, LedgerAdapter, LedgerEvent, LedgerTransaction, TransactionStatus};

#[derive(Default)]
struct MockState {
    assets: HashMap<String, Asset>,
    accounts: HashMap<String, Account>,
    /// (account, asset) -> balance
    balances: HashMap<(String, String), u128>,
    /// (account, asset) -> locked
    locked: HashMap<(String, String), u128>,
    transactions: HashMap<String, LedgerTransaction>,
    connected: bool,
}

/// In-memory ledger used for the scenarios in spec §8 and for tests of
/// the components built on top of `LedgerAdapter`. Finality is instant
/// (`confirmations: 1, min_age: 0`), per the resolution of the §9 open
/// question on finality policy.
#[derive(Clone)]
pub struct MockAdapter {
    ledger_id: String,
    state: Arc<RwLock<MockState>>,
    events: broadcast::Sender<LedgerEvent>,
}

impl MockAdapter {
    pub fn new(ledger_id: impl Into<String>) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            ledger_id: ledger_id.into(),
            state: Arc::new(RwLock::new(MockState::default())),
            events: tx,
        }
    }

    /// Test/bootstrap helper: mints `amount` of `asset` directly into
    /// `account`'s balance. Not part of the adapter interface — the
    /// interface has no notion of unbacked issuance, only transfer/lock.
    pub async fn mint(&self, account: &str, asset: &str, amount: u128) {
        let mut state = self.state.write().await;
        *state.balances.entry((account.to_string(), asset.to_string())).or_insert(0) += amount;
    }

    pub async fn register_account(&self, account: Account) {
        let mut state = self.state.write().await;
        state.accounts.insert(account.fin_id.id.clone(), account);
    }

    fn fresh_tx_hash() -> String {
        format!("mock-tx-{}", Uuid::new_v4())
    }
}

#[async_trait]
impl LedgerAdapter for MockAdapter {
    fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    async fn connect(&self) -> Result<()> {
        self.state.write().await.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.write().await.connected = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    async fn create_asset(&self, spec: AssetSpec) -> Result<Asset> {
        let asset_id = format!("{}-{}", self.ledger_id, spec.symbol);
        let asset = Asset {
            id: asset_id.clone(),
            fin_id: FinId::new(asset_id.clone(), FinIdKind::Asset, "mock.ledger"),
            symbol: spec.symbol,
            name: spec.name,
            decimals: spec.decimals,
            total_supply: spec.total_supply,
            ledger_id: self.ledger_id.clone(),
            contract_address: spec.contract_address,
            metadata: HashMap::new(),
        };
        asset.validate().map_err(FinP2PError::Other)?;
        self.state.write().await.assets.insert(asset_id, asset.clone());
        Ok(asset)
    }

    async fn get_asset(&self, asset_id: &str) -> Result<Option<Asset>> {
        Ok(self.state.read().await.assets.get(asset_id).cloned())
    }

    async fn create_account(&self, institution_id: &str) -> Result<Account> {
        let id = Uuid::new_v4().to_string();
        let account = Account::new(
            FinId::new(id.clone(), FinIdKind::Account, "mock.ledger"),
            format!("mock:{id}"),
            self.ledger_id.clone(),
            institution_id,
        );
        self.state.write().await.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.state.read().await.accounts.get(account_id).cloned())
    }

    async fn get_balance(&self, account: &str, asset: &str) -> Result<u128> {
        let state = self.state.read().await;
        Ok(*state.balances.get(&(account.to_string(), asset.to_string())).unwrap_or(&0))
    }

    async fn get_available(&self, account: &str, asset: &str) -> Result<u128> {
        let state = self.state.read().await;
        let balance = *state.balances.get(&(account.to_string(), asset.to_string())).unwrap_or(&0);
        let locked = *state.locked.get(&(account.to_string(), asset.to_string())).unwrap_or(&0);
        Ok(balance.saturating_sub(locked))
    }

    async fn get_locked(&self, account: &str, asset: &str) -> Result<u128> {
        let state = self.state.read().await;
        Ok(*state.locked.get(&(account.to_string(), asset.to_string())).unwrap_or(&0))
    }

    async fn transfer(&self, from: &str, to: &str, asset: &str, amount: u128) -> Result<String> {
        if amount == 0 {
            return Err(FinP2PError::Other("transfer amount must be > 0".into()));
        }
        let mut state = self.state.write().await;
        let available = {
            let balance = *state.balances.get(&(from.to_string(), asset.to_string())).unwrap_or(&0);
            let locked = *state.locked.get(&(from.to_string(), asset.to_string())).unwrap_or(&0);
            balance.saturating_sub(locked)
        };
        if available < amount {
            return Err(FinP2PError::InsufficientBalance(format!(
                "account {from} has {available} available, requested {amount}"
            )));
        }
        *state.balances.entry((from.to_string(), asset.to_string())).or_insert(0) -= amount;
        *state.balances.entry((to.to_string(), asset.to_string())).or_insert(0) += amount;

        let tx_hash = Self::fresh_tx_hash();
        state.transactions.insert(
            tx_hash.clone(),
            LedgerTransaction {
                tx_hash: tx_hash.clone(),
                account: from.to_string(),
                asset: asset.to_string(),
                amount,
                status: TransactionStatus::Confirmed,
                timestamp: finp2p_common::time::current_time(),
            },
        );
        let _ = self.events.send(LedgerEvent::TransactionConfirmed { tx_hash: tx_hash.clone() });
        Ok(tx_hash)
    }

    async fn lock_asset(&self, account: &str, asset: &str, amount: u128) -> Result<String> {
        if amount == 0 {
            return Err(FinP2PError::Other("lock amount must be > 0".into()));
        }
        let mut state = self.state.write().await;
        let available = {
            let balance = *state.balances.get(&(account.to_string(), asset.to_string())).unwrap_or(&0);
            let locked = *state.locked.get(&(account.to_string(), asset.to_string())).unwrap_or(&0);
            balance.saturating_sub(locked)
        };
        if available < amount {
            return Err(FinP2PError::InsufficientBalance(format!(
                "account {account} has {available} available, requested {amount}"
            )));
        }
        *state.locked.entry((account.to_string(), asset.to_string())).or_insert(0) += amount;

        let tx_hash = Self::fresh_tx_hash();
        state.transactions.insert(
            tx_hash.clone(),
            LedgerTransaction {
                tx_hash: tx_hash.clone(),
                account: account.to_string(),
                asset: asset.to_string(),
                amount,
                status: TransactionStatus::Confirmed,
                timestamp: finp2p_common::time::current_time(),
            },
        );
        let _ = self.events.send(LedgerEvent::AssetLocked {
            tx_hash: tx_hash.clone(),
            account: account.to_string(),
            asset: asset.to_string(),
            amount,
        });
        Ok(tx_hash)
    }

    async fn unlock_asset(&self, account: &str, asset: &str, amount: u128) -> Result<String> {
        let mut state = self.state.write().await;
        let entry = state.locked.entry((account.to_string(), asset.to_string())).or_insert(0);
        *entry = entry.saturating_sub(amount);

        let tx_hash = Self::fresh_tx_hash();
        state.transactions.insert(
            tx_hash.clone(),
            LedgerTransaction {
                tx_hash: tx_hash.clone(),
                account: account.to_string(),
                asset: asset.to_string(),
                amount,
                status: TransactionStatus::Confirmed,
                timestamp: finp2p_common::time::current_time(),
            },
        );
        Ok(tx_hash)
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<LedgerTransaction>> {
        Ok(self.state.read().await.transactions.get(tx_hash).cloned())
    }

    async fn get_transaction_status(&self, tx_hash: &str) -> Result<TransactionStatus> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .get(tx_hash)
            .map(|t| t.status)
            .unwrap_or(TransactionStatus::Pending))
    }

    fn finality_policy(&self) -> FinalityPolicy {
        FinalityPolicy { confirmations: 1, min_age: Duration::from_secs(0) }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mint_and_transfer_updates_balances() {
        let adapter = MockAdapter::new("mock");
        adapter.mint("a", "usd", 100).await;
        let tx_hash = adapter.transfer("a", "b", "usd", 40).await.unwrap();
        assert!(!tx_hash.is_empty());
        assert_eq!(adapter.get_balance("a", "usd").await.unwrap(), 60);
        assert_eq!(adapter.get_balance("b", "usd").await.unwrap(), 40);
    }

    #[tokio::test]
    async fn lock_reduces_available_not_balance() {
        let adapter = MockAdapter::new("mock");
        adapter.mint("a", "usd", 100).await;
        adapter.lock_asset("a", "usd", 30).await.unwrap();
        assert_eq!(adapter.get_balance("a", "usd").await.unwrap(), 100);
        assert_eq!(adapter.get_available("a", "usd").await.unwrap(), 70);
        assert_eq!(adapter.get_locked("a", "usd").await.unwrap(), 30);
    }

    #[tokio::test]
    async fn transfer_rejects_insufficient_balance() {
        let adapter = MockAdapter::new("mock");
        adapter.mint("a", "usd", 10).await;
        let err = adapter.transfer("a", "b", "usd", 20).await.unwrap_err();
        assert!(matches!(err, FinP2PError::InsufficientBalance(_)));
    }
}
