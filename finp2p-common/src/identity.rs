use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Kind of entity a [`FinId`] names (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinIdKind {
    Institution,
    Asset,
    Account,
}

/// Identity handle, immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct FinId {
    pub id: String,
    pub kind: FinIdKind,
    /// DNS-style domain of the issuing institution.
    pub domain: String,
}

impl FinId {
    pub fn new(id: impl Into<String>, kind: FinIdKind, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            domain: domain.into(),
        }
    }
}

impl std::fmt::Display for FinId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.domain)
    }
}

/// Symbolic, decimal-aware fungible token identity (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub fin_id: FinId,
    pub symbol: String,
    pub name: String,
    /// Number of decimal places, 0..=38.
    pub decimals: u8,
    pub total_supply: u128,
    pub ledger_id: String,
    pub contract_address: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Asset {
    pub fn validate(&self) -> Result<(), String> {
        if self.decimals > 38 {
            return Err(format!("decimals out of range: {}", self.decimals));
        }
        Ok(())
    }
}

/// Ledger-specific custody container (spec §3). The `balances` map is a
/// point-in-time view refreshed from the adapter on read; it is not the
/// source of truth (the ledger is).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub fin_id: FinId,
    pub address: String,
    pub ledger_id: String,
    pub institution_id: String,
    #[serde(default)]
    pub balances: HashMap<String, u128>,
}

impl Account {
    pub fn new(fin_id: FinId, address: impl Into<String>, ledger_id: impl Into<String>, institution_id: impl Into<String>) -> Self {
        Self {
            fin_id,
            address: address.into(),
            ledger_id: ledger_id.into(),
            institution_id: institution_id.into(),
            balances: HashMap::new(),
        }
    }
}
