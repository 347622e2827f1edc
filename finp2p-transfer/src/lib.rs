//! Transfer / Atomic-Swap State Machine (C6): spec §4.6.

pub mod machine;
pub mod state;
pub mod transfer;

pub use machine::{TransferManager, DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS, DEFAULT_TRANSFER_TTL_SECS};
pub use state::TransferState;
pub use transfer::{validate_route, RouteAction, RouteStep, RouteStepStatus, Transfer, TransferStatus};
