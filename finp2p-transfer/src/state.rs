use serde::{Deserialize, Serialize};

/// Per-transfer finite state (spec §4.6). Terminal: `Completed`, `Rollback`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Initiated,
    Leg1PrepareSent,
    Leg1PrepareConfirmed,
    Leg2PrepareSent,
    Leg2PrepareConfirmed,
    CommitSent,
    Completed,
    Rollback,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Rollback)
    }
}
