use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use finp2p_common::error::FinP2PError;
use finp2p_common::{time::current_time, Result};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::adapter::LedgerAdapter;
use crate::operation::{CrossLedgerOperation, OperationStatus};
use crate::reservation::{BalanceReservation, ReservationKey};

/// Default reservation TTL (spec §3, §4.2.4): 300 seconds.
pub const DEFAULT_RESERVATION_TIMEOUT_SECS: u64 = 300;
/// Default cadence of the expiry sweep (spec §4.2.4).
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS: u64 = 60;

type AdapterRegistry = Arc<RwLock<HashMap<String, Arc<dyn LedgerAdapter>>>>;
type ReservationTable = Arc<RwLock<HashMap<String, BalanceReservation>>>;

struct ReserveJob {
    key: ReservationKey,
    amount: u128,
    respond_to: oneshot::Sender<Result<String>>,
}

/// A per-`(ledger, account, asset)` FIFO worker. Requests are serialized by
/// a single task draining an mpsc channel — never by a recursive retry
/// (spec §9 design note on reservation queue recursion). The queue bucket
/// is reclaimed by the expiry sweep once `pending` returns to zero, rather
/// than racing the worker to remove itself (see DESIGN.md, open question 2).
struct QueueHandle {
    sender: mpsc::UnboundedSender<ReserveJob>,
    pending: Arc<AtomicUsize>,
}

/// Owns the adapter registry, reservation/operation tables, and per-key
/// reservation queues (spec §4.2, component C2).
pub struct LedgerManager {
    adapters: AdapterRegistry,
    reservations: ReservationTable,
    operations: RwLock<HashMap<String, CrossLedgerOperation>>,
    queues: Mutex<HashMap<ReservationKey, QueueHandle>>,
    reservation_timeout_secs: u64,
}

impl LedgerManager {
    pub fn new(reservation_timeout_secs: u64) -> Self {
        Self {
            adapters: Arc::new(RwLock::new(HashMap::new())),
            reservations: Arc::new(RwLock::new(HashMap::new())),
            operations: RwLock::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            reservation_timeout_secs,
        }
    }

    pub fn with_default_timeout() -> Self {
        Self::new(DEFAULT_RESERVATION_TIMEOUT_SECS)
    }

    pub async fn register_adapter(&self, adapter: Arc<dyn LedgerAdapter>) {
        let ledger_id = adapter.ledger_id().to_string();
        adapter.connect().await.ok();
        self.adapters.write().await.insert(ledger_id, adapter);
    }

    /// Number of reservations currently held (any status). Used by the
    /// router's periodic metrics refresh.
    pub async fn reservation_count(&self) -> usize {
        self.reservations.read().await.len()
    }

    pub async fn adapter(&self, ledger_id: &str) -> Result<Arc<dyn LedgerAdapter>> {
        self.adapters
            .read()
            .await
            .get(ledger_id)
            .cloned()
            .ok_or_else(|| FinP2PError::LedgerNotSupported(ledger_id.to_string()))
    }

    async fn require_connected(&self, ledger_id: &str) -> Result<Arc<dyn LedgerAdapter>> {
        let adapter = self.adapter(ledger_id).await?;
        if !adapter.is_connected().await {
            return Err(FinP2PError::NotConnected(ledger_id.to_string()));
        }
        Ok(adapter)
    }

    /// spec §4.2.1. `available = balance − sum_of_unpromoted_local_reservations
    /// − ledger_locked`. Reservations already promoted to an on-ledger lock
    /// are excluded from the local sum because `ledger_locked` already
    /// reflects them — summing both would double-count the same hold.
    pub async fn validate_balance_availability(
        &self,
        ledger_id: &str,
        account_id: &str,
        asset_id: &str,
        amount: u128,
    ) -> Result<bool> {
        let adapter = self.require_connected(ledger_id).await?;
        let balance = adapter.get_balance(account_id, asset_id).await?;
        let ledger_locked = adapter.get_locked(account_id, asset_id).await?;
        let local_reserved = self.sum_unpromoted_reservations(ledger_id, account_id, asset_id).await;
        let truly_available = balance.saturating_sub(local_reserved).saturating_sub(ledger_locked);
        Ok(truly_available >= amount)
    }

    async fn sum_unpromoted_reservations(&self, ledger_id: &str, account_id: &str, asset_id: &str) -> u128 {
        self.reservations
            .read()
            .await
            .values()
            .filter(|r| {
                r.ledger_id == ledger_id && r.account_id == account_id && r.asset_id == asset_id && !r.is_locked()
            })
            .map(|r| r.amount)
            .sum()
    }

    /// spec §4.2.2. Serializes on `(ledger, account, asset)` via the
    /// reservation queue; FIFO within a key, concurrent across keys.
    pub async fn reserve_balance(
        &self,
        ledger_id: &str,
        account_id: &str,
        asset_id: &str,
        amount: u128,
    ) -> Result<String> {
        if amount == 0 {
            return Err(FinP2PError::Other("reservation amount must be > 0".into()));
        }
        self.require_connected(ledger_id).await?;

        let key = ReservationKey::new(ledger_id, account_id, asset_id);
        let (resp_tx, resp_rx) = oneshot::channel();
        {
            let mut queues = self.queues.lock().await;
            let handle = queues.entry(key.clone()).or_insert_with(|| {
                let pending = Arc::new(AtomicUsize::new(0));
                let sender = spawn_worker(Arc::clone(&self.adapters), Arc::clone(&self.reservations));
                QueueHandle { sender, pending }
            });
            handle.pending.fetch_add(1, Ordering::SeqCst);
            handle
                .sender
                .send(ReserveJob { key: key.clone(), amount, respond_to: resp_tx })
                .map_err(|_| FinP2PError::Other("reservation worker unavailable".into()))?;
        }
        resp_rx
            .await
            .map_err(|_| FinP2PError::Other("reservation worker dropped without responding".into()))?
    }

    /// spec §4.2.2. Promotes a reservation to an on-ledger lock. Idempotent:
    /// calling twice on the same id returns the same `lockTxHash`.
    pub async fn lock_reserved_balance(&self, reservation_id: &str) -> Result<String> {
        let (ledger_id, account_id, asset_id, amount, already) = {
            let reservations = self.reservations.read().await;
            let r = reservations
                .get(reservation_id)
                .ok_or_else(|| FinP2PError::ReservationNotFound(reservation_id.to_string()))?;
            (r.ledger_id.clone(), r.account_id.clone(), r.asset_id.clone(), r.amount, r.lock_tx_hash.clone())
        };
        if let Some(tx_hash) = already {
            return Ok(tx_hash);
        }
        let adapter = self.require_connected(&ledger_id).await?;
        let tx_hash = adapter.lock_asset(&account_id, &asset_id, amount).await?;

        let mut reservations = self.reservations.write().await;
        if let Some(r) = reservations.get_mut(reservation_id) {
            // Re-check under the write lock: a concurrent caller may have
            // raced us to `lock_asset` already.
            if let Some(existing) = &r.lock_tx_hash {
                return Ok(existing.clone());
            }
            r.lock_tx_hash = Some(tx_hash.clone());
        }
        Ok(tx_hash)
    }

    /// spec §4.2.2. Releases are best-effort with respect to unlock: an
    /// unlock failure is logged but never leaves the reservation undeleted.
    pub async fn release_reservation(&self, reservation_id: &str, unlock: bool) -> Result<()> {
        let removed = self.reservations.write().await.remove(reservation_id);
        let Some(reservation) = removed else {
            return Err(FinP2PError::ReservationNotFound(reservation_id.to_string()));
        };
        if unlock {
            if let Some(tx_hash) = &reservation.lock_tx_hash {
                if let Ok(adapter) = self.adapter(&reservation.ledger_id).await {
                    if let Err(e) = adapter.unlock_asset(&reservation.account_id, &reservation.asset_id, reservation.amount).await {
                        warn!(reservation_id, tx_hash, error = %e, "unlock failed during release; reservation already removed");
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn get_reservation(&self, reservation_id: &str) -> Option<BalanceReservation> {
        self.reservations.read().await.get(reservation_id).cloned()
    }

    /// Sum of amounts reserved for a key, regardless of promotion state —
    /// used by tests and callers asserting round-trip invariants (spec §8:
    /// "`reserveBalance; releaseReservation(unlock=false)` leaves
    /// `getReservedAmount = 0`").
    pub async fn get_reserved_amount(&self, ledger_id: &str, account_id: &str, asset_id: &str) -> u128 {
        self.reservations
            .read()
            .await
            .values()
            .filter(|r| r.ledger_id == ledger_id && r.account_id == account_id && r.asset_id == asset_id)
            .map(|r| r.amount)
            .sum()
    }

    /// spec §4.2.3. Validates both ledgers are connected, reserves on the
    /// source, and records a pending `CrossLedgerOperation`.
    pub async fn initiate_cross_ledger_transfer(
        &self,
        from_ledger: &str,
        to_ledger: &str,
        from_account: &str,
        to_account: &str,
        asset_id: &str,
        amount: u128,
    ) -> Result<CrossLedgerOperation> {
        self.require_connected(from_ledger).await?;
        self.require_connected(to_ledger).await?;

        let reservation_id = self.reserve_balance(from_ledger, from_account, asset_id, amount).await?;

        let operation = CrossLedgerOperation {
            id: Uuid::new_v4().to_string(),
            from_ledger: from_ledger.to_string(),
            to_ledger: to_ledger.to_string(),
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
            asset_id: asset_id.to_string(),
            amount,
            reservations: vec![reservation_id],
            status: OperationStatus::Pending,
            timestamp: current_time(),
        };
        self.operations.write().await.insert(operation.id.clone(), operation.clone());
        Ok(operation)
    }

    pub async fn get_operation(&self, operation_id: &str) -> Option<CrossLedgerOperation> {
        self.operations.read().await.get(operation_id).cloned()
    }

    pub async fn mark_operation_locked(&self, operation_id: &str) -> Result<()> {
        self.transition_operation(operation_id, OperationStatus::Locked).await
    }

    pub async fn mark_operation_completed(&self, operation_id: &str) -> Result<()> {
        self.transition_operation(operation_id, OperationStatus::Completed).await
    }

    pub async fn mark_operation_failed(&self, operation_id: &str) -> Result<()> {
        self.transition_operation(operation_id, OperationStatus::Failed).await
    }

    async fn transition_operation(&self, operation_id: &str, status: OperationStatus) -> Result<()> {
        let mut operations = self.operations.write().await;
        let op = operations
            .get_mut(operation_id)
            .ok_or_else(|| FinP2PError::Other(format!("operation not found: {operation_id}")))?;
        if op.status.is_terminal() {
            return Err(FinP2PError::InvalidTransition(format!(
                "operation {operation_id} is already terminal ({:?})",
                op.status
            )));
        }
        op.status = status;
        Ok(())
    }

    /// spec §4.2.3. Releases all reservations (with unlock) and marks the
    /// operation `rolled_back`. Rejected for terminal statuses.
    pub async fn rollback_cross_ledger_operation(&self, operation_id: &str) -> Result<()> {
        let reservations = {
            let operations = self.operations.read().await;
            let op = operations
                .get(operation_id)
                .ok_or_else(|| FinP2PError::Other(format!("operation not found: {operation_id}")))?;
            if op.status.is_terminal() {
                return Err(FinP2PError::InvalidTransition(format!(
                    "operation {operation_id} is already terminal ({:?})",
                    op.status
                )));
            }
            op.reservations.clone()
        };

        for reservation_id in &reservations {
            if let Err(e) = self.release_reservation(reservation_id, true).await {
                warn!(reservation_id, error = %e, "failed to release reservation during rollback");
            }
        }

        let mut operations = self.operations.write().await;
        if let Some(op) = operations.get_mut(operation_id) {
            op.status = OperationStatus::RolledBack;
        }
        Ok(())
    }

    /// spec §4.2.4. Releases reservations older than the configured TTL,
    /// unlocking on-chain locks where promoted. Also reclaims idle
    /// reservation-queue buckets (spec §9: queue bucket removed when empty).
    pub async fn run_expiry_sweep(&self) -> usize {
        let now = current_time();
        let expired: Vec<String> = self
            .reservations
            .read()
            .await
            .values()
            .filter(|r| r.age_secs(now) >= self.reservation_timeout_secs)
            .map(|r| r.id.clone())
            .collect();

        for id in &expired {
            if let Err(e) = self.release_reservation(id, true).await {
                warn!(reservation_id = id, error = %e, "failed to release expired reservation");
            }
        }

        let mut queues = self.queues.lock().await;
        queues.retain(|_, handle| handle.pending.load(Ordering::SeqCst) > 0);

        expired.len()
    }
}

fn spawn_worker(adapters: AdapterRegistry, reservations: ReservationTable) -> mpsc::UnboundedSender<ReserveJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ReserveJob>();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let result = do_reserve(&adapters, &reservations, &job.key, job.amount).await;
            let _ = job.respond_to.send(result);
        }
    });
    tx
}

/// The critical section of `reserve_balance`, run one-at-a-time per key by
/// the worker task spawned in `spawn_worker` — this is the FIFO point
/// described in spec §4.2.2.
async fn do_reserve(
    adapters: &AdapterRegistry,
    reservations: &ReservationTable,
    key: &ReservationKey,
    amount: u128,
) -> Result<String> {
    let adapter = adapters
        .read()
        .await
        .get(&key.ledger_id)
        .cloned()
        .ok_or_else(|| FinP2PError::LedgerNotSupported(key.ledger_id.clone()))?;

    let balance = adapter.get_balance(&key.account_id, &key.asset_id).await?;
    let ledger_locked = adapter.get_locked(&key.account_id, &key.asset_id).await?;
    let local_reserved: u128 = reservations
        .read()
        .await
        .values()
        .filter(|r| {
            r.ledger_id == key.ledger_id && r.account_id == key.account_id && r.asset_id == key.asset_id && !r.is_locked()
        })
        .map(|r| r.amount)
        .sum();

    let truly_available = balance.saturating_sub(local_reserved).saturating_sub(ledger_locked);
    if truly_available < amount {
        return Err(FinP2PError::InsufficientBalance(format!(
            "{}/{}/{}: available {truly_available}, requested {amount}",
            key.ledger_id, key.account_id, key.asset_id
        )));
    }

    let reservation = BalanceReservation {
        id: Uuid::new_v4().to_string(),
        ledger_id: key.ledger_id.clone(),
        account_id: key.account_id.clone(),
        asset_id: key.asset_id.clone(),
        amount,
        created_at: current_time(),
        lock_tx_hash: None,
    };
    let id = reservation.id.clone();
    reservations.write().await.insert(id.clone(), reservation);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;

    async fn manager_with_mock() -> (LedgerManager, Arc<MockAdapter>) {
        let manager = LedgerManager::new(300);
        let adapter = Arc::new(MockAdapter::new("mock"));
        manager.register_adapter(adapter.clone()).await;
        (manager, adapter)
    }

    /// Scenario S2 (spec §8).
    #[tokio::test]
    async fn reservation_exceeds_available_then_recovers() {
        let (manager, adapter) = manager_with_mock().await;
        adapter.mint("a", "usd", 10).await;

        let r1 = manager.reserve_balance("mock", "a", "usd", 8).await.unwrap();

        let err = manager.reserve_balance("mock", "a", "usd", 5).await.unwrap_err();
        assert!(matches!(err, FinP2PError::InsufficientBalance(_)));

        manager.release_reservation(&r1, false).await.unwrap();

        let r2 = manager.reserve_balance("mock", "a", "usd", 5).await.unwrap();
        assert!(!r2.is_empty());
    }

    #[tokio::test]
    async fn release_without_unlock_zeroes_reserved_amount() {
        let (manager, adapter) = manager_with_mock().await;
        adapter.mint("a", "usd", 100).await;
        let r = manager.reserve_balance("mock", "a", "usd", 40).await.unwrap();
        manager.release_reservation(&r, false).await.unwrap();
        assert_eq!(manager.get_reserved_amount("mock", "a", "usd").await, 0);
    }

    #[tokio::test]
    async fn lock_reserved_balance_is_idempotent() {
        let (manager, adapter) = manager_with_mock().await;
        adapter.mint("a", "usd", 100).await;
        let r = manager.reserve_balance("mock", "a", "usd", 40).await.unwrap();
        let tx1 = manager.lock_reserved_balance(&r).await.unwrap();
        let tx2 = manager.lock_reserved_balance(&r).await.unwrap();
        assert_eq!(tx1, tx2);
    }

    /// Scenario S3 (spec §8).
    #[tokio::test]
    async fn cross_ledger_rollback_releases_reservations() {
        let (manager, adapter) = manager_with_mock().await;
        adapter.mint("a", "usd", 15).await;

        let op = manager
            .initiate_cross_ledger_transfer("mock", "mock", "a", "b", "usd", 15)
            .await
            .unwrap();
        assert_eq!(op.status, OperationStatus::Pending);

        manager.rollback_cross_ledger_operation(&op.id).await.unwrap();
        let after = manager.get_operation(&op.id).await.unwrap();
        assert_eq!(after.status, OperationStatus::RolledBack);
        assert_eq!(manager.get_reserved_amount("mock", "a", "usd").await, 0);
    }

    #[tokio::test]
    async fn rollback_is_rejected_for_terminal_operation() {
        let (manager, adapter) = manager_with_mock().await;
        adapter.mint("a", "usd", 15).await;
        let op = manager
            .initiate_cross_ledger_transfer("mock", "mock", "a", "b", "usd", 15)
            .await
            .unwrap();
        manager.mark_operation_completed(&op.id).await.unwrap();
        let err = manager.rollback_cross_ledger_operation(&op.id).await.unwrap_err();
        assert!(matches!(err, FinP2PError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn concurrent_reservations_on_same_key_serve_fifo() {
        let (manager, adapter) = manager_with_mock().await;
        adapter.mint("a", "usd", 100).await;
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let m = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { m.reserve_balance("mock", "a", "usd", 10).await }));
        }
        let mut ok_count = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok_count += 1;
            }
        }
        // Exactly 10 reservations of 10 fit in a balance of 100 — no
        // oversubscription despite concurrent submission.
        assert_eq!(ok_count, 10);
    }

    #[tokio::test]
    async fn expiry_sweep_releases_stale_reservations() {
        let manager = LedgerManager::new(0); // expires immediately
        let adapter = Arc::new(MockAdapter::new("mock"));
        manager.register_adapter(adapter.clone()).await;
        adapter.mint("a", "usd", 50).await;
        manager.reserve_balance("mock", "a", "usd", 10).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let released = manager.run_expiry_sweep().await;
        assert_eq!(released, 1);
        assert_eq!(manager.get_reserved_amount("mock", "a", "usd").await, 0);
    }
}
