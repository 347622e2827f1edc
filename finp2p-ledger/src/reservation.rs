use serde::{Deserialize, Serialize};

/// Soft claim on a ledger balance, optionally promoted to an on-ledger
/// lock (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceReservation {
    pub id: String,
    pub ledger_id: String,
    pub account_id: String,
    pub asset_id: String,
    pub amount: u128,
    pub created_at: u64,
    pub lock_tx_hash: Option<String>,
}

impl BalanceReservation {
    pub fn is_locked(&self) -> bool {
        self.lock_tx_hash.is_some()
    }

    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

/// Key identifying the FIFO reservation queue a request serializes on
/// (spec §4.2.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReservationKey {
    pub ledger_id: String,
    pub account_id: String,
    pub asset_id: String,
}

impl ReservationKey {
    pub fn new(ledger_id: impl Into<String>, account_id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            account_id: account_id.into(),
            asset_id: asset_id.into(),
        }
    }
}
