use finp2p_common::CURRENT_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

fn default_schema_version() -> u16 {
    CURRENT_SCHEMA_VERSION
}

/// The leg of a transfer a router is being asked to confirm (spec §3,
/// `ConfirmationRecord`). Deliberately narrower than `finp2p-transfer`'s
/// `Transfer` type so this crate has no dependency on the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationInput {
    pub transfer_id: String,
    pub from_account: String,
    pub to_account: String,
    pub asset_id: String,
    pub amount: u128,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Confirmed,
    Failed,
    RolledBack,
}

/// Signed confirmation of one leg of a transfer, written under
/// `finp2p:confirmations:{routerId}` (spec §3, §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    pub id: String,
    pub transfer_id: String,
    pub router_id: String,
    pub status: ConfirmationStatus,
    pub from_account: String,
    pub to_account: String,
    pub asset_id: String,
    pub amount: u128,
    pub ledger_tx_hash: Option<String>,
    pub timestamp: u64,
    pub signature: Vec<u8>,
    pub rollback_reason: Option<String>,
    pub rollback_timestamp: Option<u64>,
}

/// The bytes actually signed for a `ConfirmationRecord` (spec §9: a single
/// canonical payload, everywhere).
#[derive(Serialize)]
pub struct ConfirmationSignedPayload<'a> {
    pub transfer_id: &'a str,
    pub router_id: &'a str,
    pub status: ConfirmationStatus,
    pub amount: u128,
    pub timestamp: u64,
}

/// Aggregate dual-confirmation state for a transfer (spec §3). Keyed by
/// router id rather than two fixed named slots so the derivation below is
/// correct for any number of participating routers; for the two-router
/// federation the spec describes, the behavior is identical to named
/// `router_a`/`router_b` slots (documented in DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DualConfirmationStatus {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    pub transfer_id: String,
    pub confirmations: std::collections::BTreeMap<String, ConfirmationSummary>,
    pub status: DualStatus,
    pub completed_at: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSummary {
    pub confirmation_id: String,
    pub status: ConfirmationStatus,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DualStatus {
    #[default]
    Pending,
    PartialConfirmed,
    DualConfirmed,
    Failed,
}

impl DualConfirmationStatus {
    pub fn new(transfer_id: impl Into<String>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            transfer_id: transfer_id.into(),
            confirmations: Default::default(),
            status: DualStatus::Pending,
            completed_at: None,
        }
    }

    /// Recomputes `status` from the present per-router confirmations
    /// (spec §3): any failed/rolled-back leg fails the whole transfer; two
    /// present and both confirmed is dual-confirmed; exactly one present is
    /// partial; otherwise pending.
    pub fn recompute(&mut self, now: u64) {
        let any_failed = self
            .confirmations
            .values()
            .any(|c| matches!(c.status, ConfirmationStatus::Failed | ConfirmationStatus::RolledBack));
        if any_failed {
            self.status = DualStatus::Failed;
            self.completed_at = None;
            return;
        }
        let confirmed_count = self
            .confirmations
            .values()
            .filter(|c| c.status == ConfirmationStatus::Confirmed)
            .count();
        self.status = match (confirmed_count, self.confirmations.len()) {
            (n, total) if n >= 2 && n == total => DualStatus::DualConfirmed,
            (1, _) => DualStatus::PartialConfirmed,
            _ => DualStatus::Pending,
        };
        self.completed_at = if self.status == DualStatus::DualConfirmed { Some(now) } else { None };
    }
}
