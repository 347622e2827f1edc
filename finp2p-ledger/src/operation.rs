use serde::{Deserialize, Serialize};

/// Status of a [`CrossLedgerOperation`] (spec §3). `Completed`, `Failed`,
/// and `RolledBack` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Locked,
    Completed,
    Failed,
    RolledBack,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed | OperationStatus::RolledBack)
    }
}

/// Envelope binding N reservations into an atomic cross-ledger unit
/// (spec §3, §4.2.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossLedgerOperation {
    pub id: String,
    pub from_ledger: String,
    pub to_ledger: String,
    pub from_account: String,
    pub to_account: String,
    pub asset_id: String,
    pub amount: u128,
    pub reservations: Vec<String>,
    pub status: OperationStatus,
    pub timestamp: u64,
}
