use std::collections::HashMap;

use finp2p_common::CURRENT_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

/// Authority record binding an asset to a primary router and zero or more
/// backup routers (spec §3, §6.4 `finp2p:asset_registry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRegistration {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    pub asset_id: String,
    pub primary_router_id: String,
    pub backup_router_ids: Vec<String>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_schema_version() -> u16 {
    CURRENT_SCHEMA_VERSION
}

/// Outcome of `validate_authority` (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorityDecision {
    pub authorized: bool,
    pub reason: String,
    pub primary: String,
    pub backups: Vec<String>,
}
