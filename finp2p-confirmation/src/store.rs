use std::collections::BTreeMap;

use finp2p_common::crypto::RouterSigner;
use finp2p_common::error::FinP2PError;
use finp2p_common::time::current_time_ms;
use finp2p_common::{Result, CURRENT_SCHEMA_VERSION};
use finp2p_store::{keys, Store};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::record::{
    ConfirmationInput, ConfirmationRecord, ConfirmationSignedPayload, ConfirmationStatus, ConfirmationSummary,
    DualConfirmationStatus,
};

/// Per-asset, per-user aggregate produced by `generate_regulatory_report`
/// (spec §4.4). Field order kept deterministic (`BTreeMap`) so two reports
/// over the same window are byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatoryReport {
    pub router_id: String,
    pub from_ts: u64,
    pub to_ts: u64,
    pub total_confirmations: u64,
    pub total_failed: u64,
    pub volume_by_asset: BTreeMap<String, u128>,
    pub confirmation_count_by_user: BTreeMap<String, u64>,
}

/// Confirmation Record Store (spec §4.4, component C4): durable,
/// append-mostly log of signed per-leg confirmations plus the derived
/// dual-confirmation status for each transfer.
pub struct ConfirmationRecordStore {
    store: Store,
    router_id: String,
    signer: RouterSigner,
}

impl ConfirmationRecordStore {
    pub fn new(store: Store, router_id: impl Into<String>, signer: RouterSigner) -> Self {
        Self { store, router_id: router_id.into(), signer }
    }

    pub fn router_id(&self) -> &str {
        &self.router_id
    }

    /// Writes a signed confirmation for one leg of `input` and updates the
    /// shared dual-confirmation status for the transfer (spec §3, §4.4).
    pub async fn create_confirmation_record(
        &self,
        input: &ConfirmationInput,
        status: ConfirmationStatus,
        ledger_tx_hash: Option<String>,
    ) -> Result<ConfirmationRecord> {
        let now = current_time_ms();
        let payload = ConfirmationSignedPayload {
            transfer_id: &input.transfer_id,
            router_id: &self.router_id,
            status,
            amount: input.amount,
            timestamp: now,
        };
        let signature = self.signer.sign(&payload)?;

        let record = ConfirmationRecord {
            schema_version: CURRENT_SCHEMA_VERSION,
            id: Uuid::new_v4().to_string(),
            transfer_id: input.transfer_id.clone(),
            router_id: self.router_id.clone(),
            status,
            from_account: input.from_account.clone(),
            to_account: input.to_account.clone(),
            asset_id: input.asset_id.clone(),
            amount: input.amount,
            ledger_tx_hash,
            timestamp: now,
            signature,
            rollback_reason: None,
            rollback_timestamp: None,
        };

        self.persist_record(&record).await?;
        self.store.s_add(&keys::user_transactions(&input.from_account), &record.id).await?;
        self.store.s_add(&keys::asset_transactions(&input.asset_id), &record.id).await?;
        self.update_dual_status(&record).await?;

        debug!(transfer_id = %record.transfer_id, router_id = %self.router_id, ?status, "confirmation recorded");
        Ok(record)
    }

    /// Marks a previously-recorded confirmation (written by this router) as
    /// rolled back and recomputes the transfer's dual-confirmation status
    /// (spec §4.4 `rollbackConfirmation`).
    pub async fn rollback_confirmation(&self, confirmation_id: &str, reason: impl Into<String>) -> Result<ConfirmationRecord> {
        let mut record = self.get_own_record(confirmation_id).await?;
        record.status = ConfirmationStatus::RolledBack;
        record.rollback_reason = Some(reason.into());
        record.rollback_timestamp = Some(current_time_ms());

        self.persist_record(&record).await?;
        self.update_dual_status(&record).await?;
        Ok(record)
    }

    pub async fn get_confirmation(&self, confirmation_id: &str) -> Result<Option<ConfirmationRecord>> {
        match self.store.h_get(&keys::confirmations(&self.router_id), confirmation_id).await? {
            Some(raw) => Ok(Some(deserialize_record(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn get_dual_status(&self, transfer_id: &str) -> Result<DualConfirmationStatus> {
        self.load_dual_status(transfer_id).await
    }

    /// Aggregates this router's own confirmations in `[from_ts, to_ts)`
    /// (spec §4.4 `generateRegulatoryReport`).
    pub async fn generate_regulatory_report(&self, from_ts: u64, to_ts: u64) -> Result<RegulatoryReport> {
        let all = self.store.h_get_all(&keys::confirmations(&self.router_id)).await?;
        let mut report = RegulatoryReport {
            router_id: self.router_id.clone(),
            from_ts,
            to_ts,
            total_confirmations: 0,
            total_failed: 0,
            volume_by_asset: BTreeMap::new(),
            confirmation_count_by_user: BTreeMap::new(),
        };

        for (_, raw) in all {
            let record: ConfirmationRecord = deserialize_record(&raw)?;
            if record.timestamp < from_ts || record.timestamp >= to_ts {
                continue;
            }
            match record.status {
                ConfirmationStatus::Confirmed => {
                    report.total_confirmations += 1;
                    *report.volume_by_asset.entry(record.asset_id.clone()).or_insert(0) += record.amount;
                }
                ConfirmationStatus::Failed | ConfirmationStatus::RolledBack => {
                    report.total_failed += 1;
                }
            }
            *report.confirmation_count_by_user.entry(record.from_account.clone()).or_insert(0) += 1;
        }
        Ok(report)
    }

    /// Deletes this router's own confirmation records older than
    /// `max_age_ms` (spec §4.4 `cleanupOldRecords`). The `user_transactions`
    /// / `asset_transactions` indices are left with dangling ids; readers
    /// resolve those via `get_confirmation` returning `None`.
    pub async fn cleanup_old_records(&self, max_age_ms: u64) -> Result<usize> {
        let cutoff = current_time_ms().saturating_sub(max_age_ms);
        let all = self.store.h_get_all(&keys::confirmations(&self.router_id)).await?;
        let mut removed = 0;
        for (id, raw) in all {
            let record: ConfirmationRecord = deserialize_record(&raw)?;
            if record.timestamp < cutoff {
                self.store.h_del(&keys::confirmations(&self.router_id), &id).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(router_id = %self.router_id, removed, "pruned stale confirmation records");
        }
        Ok(removed)
    }

    async fn get_own_record(&self, confirmation_id: &str) -> Result<ConfirmationRecord> {
        self.get_confirmation(confirmation_id)
            .await?
            .ok_or_else(|| FinP2PError::ReservationNotFound(confirmation_id.to_string()))
    }

    async fn persist_record(&self, record: &ConfirmationRecord) -> Result<()> {
        let raw = serde_json::to_string(record).map_err(|e| FinP2PError::Store(format!("failed to serialize confirmation record: {e}")))?;
        self.store.h_set(&keys::confirmations(&self.router_id), &record.id, &raw).await
    }

    async fn load_dual_status(&self, transfer_id: &str) -> Result<DualConfirmationStatus> {
        match self.store.get(&keys::dual_confirmations(transfer_id)).await? {
            Some(raw) => {
                let status: DualConfirmationStatus =
                    serde_json::from_str(&raw).map_err(|e| FinP2PError::Store(format!("corrupt dual confirmation status: {e}")))?;
                if status.schema_version > CURRENT_SCHEMA_VERSION {
                    return Err(FinP2PError::UnsupportedSchemaVersion { found: status.schema_version, max: CURRENT_SCHEMA_VERSION });
                }
                Ok(status)
            }
            None => Ok(DualConfirmationStatus::new(transfer_id)),
        }
    }

    async fn update_dual_status(&self, record: &ConfirmationRecord) -> Result<()> {
        let mut status = self.load_dual_status(&record.transfer_id).await?;
        status.confirmations.insert(
            record.router_id.clone(),
            ConfirmationSummary { confirmation_id: record.id.clone(), status: record.status, timestamp: record.timestamp },
        );
        let now = current_time_ms();
        status.recompute(now);

        let raw = serde_json::to_string(&status).map_err(|e| FinP2PError::Store(format!("failed to serialize dual confirmation status: {e}")))?;
        self.store.set(&keys::dual_confirmations(&record.transfer_id), &raw).await?;

        if status.status == crate::record::DualStatus::DualConfirmed {
            if let Err(e) = self.store.set(&keys::transfer_completion(&record.transfer_id), &now.to_string()).await {
                warn!(transfer_id = %record.transfer_id, error = %e, "failed to record transfer completion timestamp");
            }
        }
        Ok(())
    }
}

fn deserialize_record(raw: &str) -> Result<ConfirmationRecord> {
    let record: ConfirmationRecord = serde_json::from_str(raw).map_err(|e| FinP2PError::Store(format!("corrupt confirmation record: {e}")))?;
    if record.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(FinP2PError::UnsupportedSchemaVersion { found: record.schema_version, max: CURRENT_SCHEMA_VERSION });
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DualStatus;

    fn store() -> ConfirmationRecordStore {
        ConfirmationRecordStore::new(Store::local(), "router-a", RouterSigner::generate())
    }

    fn input(transfer_id: &str) -> ConfirmationInput {
        ConfirmationInput {
            transfer_id: transfer_id.to_string(),
            from_account: "alice".into(),
            to_account: "bob".into(),
            asset_id: "asset-1".into(),
            amount: 100,
        }
    }

    #[tokio::test]
    async fn single_confirmation_is_partial() {
        let store = store();
        store.create_confirmation_record(&input("t1"), ConfirmationStatus::Confirmed, None).await.unwrap();
        let dual = store.get_dual_status("t1").await.unwrap();
        assert_eq!(dual.status, DualStatus::PartialConfirmed);
    }

    /// Scenario S4 (spec §8): two routers confirming the same transfer
    /// drives it to dual-confirmed.
    #[tokio::test]
    async fn two_confirmations_from_different_routers_dual_confirm() {
        let underlying = Store::local();
        let store_a = ConfirmationRecordStore::new(underlying.clone(), "router-a", RouterSigner::generate());
        let store_b = ConfirmationRecordStore::new(underlying, "router-b", RouterSigner::generate());

        store_a.create_confirmation_record(&input("t1"), ConfirmationStatus::Confirmed, None).await.unwrap();
        store_b.create_confirmation_record(&input("t1"), ConfirmationStatus::Confirmed, None).await.unwrap();

        let dual = store_a.get_dual_status("t1").await.unwrap();
        assert_eq!(dual.status, DualStatus::DualConfirmed);
        assert!(dual.completed_at.is_some());
    }

    #[tokio::test]
    async fn one_failed_leg_fails_the_transfer() {
        let underlying = Store::local();
        let store_a = ConfirmationRecordStore::new(underlying.clone(), "router-a", RouterSigner::generate());
        let store_b = ConfirmationRecordStore::new(underlying, "router-b", RouterSigner::generate());

        store_a.create_confirmation_record(&input("t1"), ConfirmationStatus::Confirmed, None).await.unwrap();
        store_b.create_confirmation_record(&input("t1"), ConfirmationStatus::Failed, None).await.unwrap();

        let dual = store_a.get_dual_status("t1").await.unwrap();
        assert_eq!(dual.status, DualStatus::Failed);
    }

    #[tokio::test]
    async fn rollback_marks_failed_and_updates_dual_status() {
        let store = store();
        let record = store.create_confirmation_record(&input("t1"), ConfirmationStatus::Confirmed, None).await.unwrap();
        let rolled_back = store.rollback_confirmation(&record.id, "duplicate submission").await.unwrap();
        assert_eq!(rolled_back.status, ConfirmationStatus::RolledBack);
        let dual = store.get_dual_status("t1").await.unwrap();
        assert_eq!(dual.status, DualStatus::Failed);
    }

    #[tokio::test]
    async fn regulatory_report_aggregates_confirmed_volume_by_asset() {
        let store = store();
        store.create_confirmation_record(&input("t1"), ConfirmationStatus::Confirmed, None).await.unwrap();
        store.create_confirmation_record(&input("t2"), ConfirmationStatus::Confirmed, None).await.unwrap();
        store.create_confirmation_record(&input("t3"), ConfirmationStatus::Failed, None).await.unwrap();

        let report = store.generate_regulatory_report(0, u64::MAX).await.unwrap();
        assert_eq!(report.total_confirmations, 2);
        assert_eq!(report.total_failed, 1);
        assert_eq!(report.volume_by_asset.get("asset-1"), Some(&200));
    }

    #[tokio::test]
    async fn cleanup_removes_records_older_than_max_age() {
        let store = store();
        store.create_confirmation_record(&input("t1"), ConfirmationStatus::Confirmed, None).await.unwrap();
        let removed = store.cleanup_old_records(0).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.generate_regulatory_report(0, u64::MAX).await.unwrap().total_confirmations == 0);
    }
}
