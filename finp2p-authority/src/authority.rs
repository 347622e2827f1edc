use std::collections::HashMap;

use finp2p_common::error::FinP2PError;
use finp2p_common::time::current_time_ms;
use finp2p_common::{Result, CURRENT_SCHEMA_VERSION};
use finp2p_store::{keys, Store};
use tracing::debug;

use crate::registration::{AssetRegistration, AuthorityDecision};

/// Default heartbeat freshness window (spec §4.3): 30 seconds.
pub const DEFAULT_HEARTBEAT_WINDOW_MS: u64 = 30_000;
/// Default heartbeat broadcast interval (spec §4.3).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Primary Router Authority (spec §4.3, component C3): asset→primary/backup
/// mapping, heartbeat-driven failover, authority validation and transfer.
pub struct PrimaryRouterAuthority {
    store: Store,
    router_id: String,
    heartbeat_window_ms: u64,
}

impl PrimaryRouterAuthority {
    pub fn new(store: Store, router_id: impl Into<String>) -> Self {
        Self {
            store,
            router_id: router_id.into(),
            heartbeat_window_ms: DEFAULT_HEARTBEAT_WINDOW_MS,
        }
    }

    pub fn with_heartbeat_window(mut self, window_ms: u64) -> Self {
        self.heartbeat_window_ms = window_ms;
        self
    }

    /// Registers this router as the primary for `asset_id`. Fails with
    /// `AlreadyRegistered` without mutating state if the asset already has
    /// a registration (spec §8 boundary behavior).
    pub async fn register_asset(
        &self,
        asset_id: &str,
        metadata: HashMap<String, String>,
        backup_router_ids: Vec<String>,
    ) -> Result<AssetRegistration> {
        if backup_router_ids.contains(&self.router_id) {
            return Err(FinP2PError::Other("primary router cannot also be a backup".into()));
        }
        if self.load_registration(asset_id).await?.is_some() {
            return Err(FinP2PError::AlreadyRegistered(asset_id.to_string()));
        }

        let now = current_time_ms();
        let registration = AssetRegistration {
            schema_version: CURRENT_SCHEMA_VERSION,
            asset_id: asset_id.to_string(),
            primary_router_id: self.router_id.clone(),
            backup_router_ids,
            created_at: now,
            updated_at: now,
            metadata,
        };
        self.persist(&registration).await?;
        self.store.s_add(&keys::router_assets(&self.router_id), asset_id).await?;
        Ok(registration)
    }

    pub async fn get_asset_registration(&self, asset_id: &str) -> Result<Option<AssetRegistration>> {
        self.load_registration(asset_id).await
    }

    async fn load_registration(&self, asset_id: &str) -> Result<Option<AssetRegistration>> {
        let Some(raw) = self.store.h_get(keys::ASSET_REGISTRY, asset_id).await? else {
            return Ok(None);
        };
        let registration: AssetRegistration =
            serde_json::from_str(&raw).map_err(|e| FinP2PError::Store(format!("corrupt asset registration: {e}")))?;
        if registration.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(FinP2PError::UnsupportedSchemaVersion {
                found: registration.schema_version,
                max: CURRENT_SCHEMA_VERSION,
            });
        }
        Ok(Some(registration))
    }

    async fn persist(&self, registration: &AssetRegistration) -> Result<()> {
        let raw = serde_json::to_string(registration)
            .map_err(|e| FinP2PError::Store(format!("failed to serialize asset registration: {e}")))?;
        self.store.h_set(keys::ASSET_REGISTRY, &registration.asset_id, &raw).await
    }

    /// spec §4.3. Requester = primary ⇒ authorized. Requester ∈ backups ⇒
    /// authorized iff primary heartbeat is stale. Otherwise refused.
    pub async fn validate_authority(&self, asset_id: &str, requesting_router_id: &str) -> Result<AuthorityDecision> {
        let Some(registration) = self.load_registration(asset_id).await? else {
            return Ok(AuthorityDecision {
                authorized: false,
                reason: "no authority: asset not registered".into(),
                primary: String::new(),
                backups: Vec::new(),
            });
        };

        if requesting_router_id == registration.primary_router_id {
            return Ok(AuthorityDecision {
                authorized: true,
                reason: "requester is primary".into(),
                primary: registration.primary_router_id,
                backups: registration.backup_router_ids,
            });
        }

        if registration.backup_router_ids.iter().any(|b| b == requesting_router_id) {
            let primary_available = self.is_available(&registration.primary_router_id).await?;
            return Ok(if primary_available {
                AuthorityDecision {
                    authorized: false,
                    reason: "primary available".into(),
                    primary: registration.primary_router_id,
                    backups: registration.backup_router_ids,
                }
            } else {
                AuthorityDecision {
                    authorized: true,
                    reason: "primary unavailable".into(),
                    primary: registration.primary_router_id,
                    backups: registration.backup_router_ids,
                }
            });
        }

        Ok(AuthorityDecision {
            authorized: false,
            reason: "no authority".into(),
            primary: registration.primary_router_id,
            backups: registration.backup_router_ids,
        })
    }

    /// spec §4.3. A router with no recorded heartbeat is unavailable.
    pub async fn is_available(&self, router_id: &str) -> Result<bool> {
        let Some(raw) = self.store.get(&keys::router_heartbeat(router_id)).await? else {
            return Ok(false);
        };
        let last_heartbeat: u64 = raw
            .parse()
            .map_err(|_| FinP2PError::Store(format!("corrupt heartbeat value for {router_id}")))?;
        let now = current_time_ms();
        Ok(now.saturating_sub(last_heartbeat) < self.heartbeat_window_ms)
    }

    /// Writes this router's own heartbeat. Call on a periodic cadence
    /// (spec §4.3: default every 30s) from the router core.
    pub async fn write_heartbeat(&self) -> Result<()> {
        self.store
            .set(&keys::router_heartbeat(&self.router_id), &current_time_ms().to_string())
            .await?;
        debug!(router_id = %self.router_id, "heartbeat written");
        Ok(())
    }

    /// spec §4.3. Accepted only when invoked by the current primary and
    /// `new_primary ∈ backups`; swaps them and updates both indices.
    pub async fn transfer_authority(&self, asset_id: &str, new_primary_router_id: &str) -> Result<AssetRegistration> {
        let mut registration = self
            .load_registration(asset_id)
            .await?
            .ok_or_else(|| FinP2PError::Other(format!("asset not registered: {asset_id}")))?;

        if registration.primary_router_id != self.router_id {
            return Err(FinP2PError::AuthorityDenied(format!(
                "{} is not the current primary for {asset_id}",
                self.router_id
            )));
        }
        if !registration.backup_router_ids.iter().any(|b| b == new_primary_router_id) {
            return Err(FinP2PError::AuthorityDenied(format!(
                "{new_primary_router_id} is not a registered backup for {asset_id}"
            )));
        }

        let old_primary = registration.primary_router_id.clone();
        registration.backup_router_ids.retain(|b| b != new_primary_router_id);
        registration.backup_router_ids.push(old_primary.clone());
        registration.primary_router_id = new_primary_router_id.to_string();
        registration.updated_at = current_time_ms();

        self.persist(&registration).await?;
        self.store.s_rem(&keys::router_assets(&old_primary), asset_id).await?;
        self.store.s_add(&keys::router_assets(new_primary_router_id), asset_id).await?;

        Ok(registration)
    }
}
