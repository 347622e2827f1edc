//! Shared types, errors, crypto, and time helpers for the FinP2P router core.

pub mod crypto;
pub mod error;
pub mod identity;
pub mod time;

pub use error::{FinP2PError, Result};
pub use identity::{Account, Asset, FinId, FinIdKind};

/// Current schema version for records round-tripped through `finp2p-store`
/// (spec §9 design note on dynamic JSON; see SPEC_FULL.md §3).
pub const CURRENT_SCHEMA_VERSION: u16 = 1;
