use std::collections::HashMap;

use finp2p_common::error::FinP2PError;
use finp2p_common::{FinId, Result, CURRENT_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};

fn default_schema_version() -> u16 {
    CURRENT_SCHEMA_VERSION
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Routing,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    Lock,
    Unlock,
    Mint,
    Burn,
    Transfer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteStepStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

/// One hop of a transfer plan (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStep {
    pub router_id: String,
    pub ledger_id: String,
    pub action: RouteAction,
    pub status: RouteStepStatus,
    pub tx_hash: Option<String>,
    pub timestamp: u64,
}

impl RouteStep {
    pub fn new(router_id: impl Into<String>, ledger_id: impl Into<String>, action: RouteAction, now: u64) -> Self {
        Self { router_id: router_id.into(), ledger_id: ledger_id.into(), action, status: RouteStepStatus::Pending, tx_hash: None, timestamp: now }
    }
}

/// Structural rule (spec §3): a `lock` step must be succeeded by `mint`; a
/// `burn` step must be succeeded by `unlock`. Validated before execution.
pub fn validate_route(route: &[RouteStep]) -> Result<()> {
    for (i, step) in route.iter().enumerate() {
        let required_next = match step.action {
            RouteAction::Lock => Some(RouteAction::Mint),
            RouteAction::Burn => Some(RouteAction::Unlock),
            RouteAction::Unlock | RouteAction::Mint | RouteAction::Transfer => None,
        };
        if let Some(expected) = required_next {
            match route.get(i + 1) {
                Some(next) if next.action == expected => {}
                _ => {
                    return Err(FinP2PError::Other(format!(
                        "route step {i} ({:?}) must be followed by {expected:?}",
                        step.action
                    )))
                }
            }
        }
    }
    Ok(())
}

/// User-visible transfer request (spec §3, component C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    pub id: String,
    pub from_account: FinId,
    pub to_account: FinId,
    pub asset: FinId,
    pub amount: u128,
    pub status: TransferStatus,
    pub route: Vec<RouteStep>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub completed_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_must_be_followed_by_mint() {
        let route = vec![RouteStep::new("r1", "sui", RouteAction::Lock, 0), RouteStep::new("r1", "hedera", RouteAction::Mint, 0)];
        assert!(validate_route(&route).is_ok());

        let bad_route = vec![RouteStep::new("r1", "sui", RouteAction::Lock, 0), RouteStep::new("r1", "hedera", RouteAction::Transfer, 0)];
        assert!(validate_route(&bad_route).is_err());
    }

    #[test]
    fn burn_must_be_followed_by_unlock() {
        let route = vec![RouteStep::new("r1", "sui", RouteAction::Burn, 0), RouteStep::new("r1", "sui", RouteAction::Unlock, 0)];
        assert!(validate_route(&route).is_ok());

        let bad_route = vec![RouteStep::new("r1", "sui", RouteAction::Burn, 0)];
        assert!(validate_route(&bad_route).is_err());
    }

    #[test]
    fn single_transfer_step_needs_no_successor() {
        let route = vec![RouteStep::new("r1", "sui", RouteAction::Transfer, 0)];
        assert!(validate_route(&route).is_ok());
    }
}
