use std::collections::HashMap;
use std::sync::Arc;

use finp2p_common::error::FinP2PError;
use finp2p_common::time::current_time_ms;
use finp2p_common::{FinId, Result};
use finp2p_confirmation::{ConfirmationInput, ParallelConfirmationProcessor, Priority};
use finp2p_ledger::LedgerManager;
use finp2p_store::Store;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::TransferState;
use crate::transfer::{validate_route, RouteAction, RouteStep, RouteStepStatus, Transfer, TransferStatus};

/// Default transfer TTL (spec §4.6): 60 minutes.
pub const DEFAULT_TRANSFER_TTL_SECS: u64 = 60 * 60;
/// Default expiry sweep cadence (spec §4.6): 60 seconds.
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS: u64 = 60;

struct TransferRecord {
    transfer: Transfer,
    state: TransferState,
    operation_id: Option<String>,
    reservation_id: Option<String>,
}

/// Transfer / Atomic-Swap State Machine (spec §4.6, component C6). Drives
/// each transfer through `Initiated → ... → Completed`, or `Rollback` on
/// any failure, by delegating ledger-level work to the Ledger Manager (C2)
/// and emitting confirmation tasks to the Parallel Confirmation Processor
/// (C5) once a transfer completes.
///
/// Grounded on the step-by-step driver shape of a consensus/runtime driver
/// loop (see the teacher's node runtime), adapted here to a single-transfer
/// FSM: `advance` performs exactly one state transition and is safe to call
/// repeatedly (from a listener reacting to `LedgerEvent`s, or from
/// `execute_transfer`'s run-to-completion loop used by tests and the mock
/// adapter path, where ledger calls resolve synchronously).
pub struct TransferManager {
    router_id: String,
    ledger: Arc<LedgerManager>,
    confirmation_processor: Option<Arc<ParallelConfirmationProcessor>>,
    event_store: Option<Store>,
    transfers: RwLock<HashMap<String, TransferRecord>>,
    ttl_secs: u64,
}

impl TransferManager {
    pub fn new(router_id: impl Into<String>, ledger: Arc<LedgerManager>) -> Self {
        Self {
            router_id: router_id.into(),
            ledger,
            confirmation_processor: None,
            event_store: None,
            transfers: RwLock::new(HashMap::new()),
            ttl_secs: DEFAULT_TRANSFER_TTL_SECS,
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_confirmation_processor(mut self, processor: Arc<ParallelConfirmationProcessor>) -> Self {
        self.confirmation_processor = Some(processor);
        self
    }

    /// Publishes transfer status changes on `finp2p:events:{transferId}`
    /// (spec §9 design note: cross-process event bus for multi-router
    /// deployments) whenever a backing `Store` is attached.
    pub fn with_event_store(mut self, store: Store) -> Self {
        self.event_store = Some(store);
        self
    }

    /// Best-effort: publishing is observational, never a transfer blocker.
    async fn publish_status(&self, transfer_id: &str, status: TransferStatus) {
        let Some(store) = &self.event_store else { return };
        let payload = serde_json::json!({ "transferId": transfer_id, "status": status }).to_string();
        if let Err(e) = store.publish(&finp2p_store::keys::events(transfer_id), &payload).await {
            warn!(transfer_id, error = %e, "failed to publish transfer event");
        }
    }

    /// Builds the route and registers a new transfer in `Pending` /
    /// `Initiated` state. Rejects `amount == 0` before any I/O (spec §8
    /// boundary behavior).
    pub async fn initiate_transfer(
        &self,
        from_account: FinId,
        to_account: FinId,
        asset: FinId,
        from_ledger: impl Into<String>,
        to_ledger: impl Into<String>,
        amount: u128,
    ) -> Result<Transfer> {
        if amount == 0 {
            return Err(FinP2PError::Other("transfer amount must be > 0".into()));
        }
        let from_ledger = from_ledger.into();
        let to_ledger = to_ledger.into();
        let now = current_time_ms();

        let route = if from_ledger == to_ledger {
            vec![RouteStep::new(&self.router_id, &from_ledger, RouteAction::Transfer, now)]
        } else {
            vec![
                RouteStep::new(&self.router_id, &from_ledger, RouteAction::Lock, now),
                RouteStep::new(&self.router_id, &to_ledger, RouteAction::Mint, now),
            ]
        };
        validate_route(&route)?;

        let transfer = Transfer {
            schema_version: finp2p_common::CURRENT_SCHEMA_VERSION,
            id: Uuid::new_v4().to_string(),
            from_account,
            to_account,
            asset,
            amount,
            status: TransferStatus::Pending,
            route,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.transfers.write().await.insert(
            transfer.id.clone(),
            TransferRecord { transfer: transfer.clone(), state: TransferState::Initiated, operation_id: None, reservation_id: None },
        );
        debug!(transfer_id = %transfer.id, "transfer initiated");
        Ok(transfer)
    }

    pub async fn get_transfer(&self, transfer_id: &str) -> Option<Transfer> {
        self.transfers.read().await.get(transfer_id).map(|r| r.transfer.clone())
    }

    /// Number of transfers not yet in a terminal state. Used by the
    /// router's periodic metrics refresh.
    pub async fn active_count(&self) -> usize {
        self.transfers.read().await.values().filter(|r| !r.state.is_terminal()).count()
    }

    /// Performs exactly one state transition for `transfer_id` (spec §4.6).
    pub async fn advance(&self, transfer_id: &str) -> Result<TransferState> {
        let state = {
            let transfers = self.transfers.read().await;
            let record = transfers.get(transfer_id).ok_or_else(|| FinP2PError::Other(format!("transfer not found: {transfer_id}")))?;
            record.state
        };
        if state.is_terminal() {
            return Err(FinP2PError::InvalidTransition(format!("transfer {transfer_id} is already {state:?}")));
        }

        match state {
            TransferState::Initiated => self.do_initiated(transfer_id).await,
            TransferState::Leg1PrepareSent => self.do_leg1_prepare_sent(transfer_id).await,
            TransferState::Leg1PrepareConfirmed => self.do_leg1_prepare_confirmed(transfer_id).await,
            TransferState::Leg2PrepareSent => self.do_leg2_prepare_sent(transfer_id).await,
            TransferState::Leg2PrepareConfirmed => self.do_leg2_prepare_confirmed(transfer_id).await,
            TransferState::CommitSent => self.do_commit_sent(transfer_id).await,
            TransferState::Completed | TransferState::Rollback => unreachable!("checked above"),
        }
    }

    /// Runs `advance` to completion (`Completed` or `Rollback`).
    pub async fn execute_transfer(&self, transfer_id: &str) -> Result<Transfer> {
        loop {
            let state = self.advance(transfer_id).await?;
            if state.is_terminal() {
                return self.get_transfer(transfer_id).await.ok_or_else(|| FinP2PError::Other(format!("transfer not found: {transfer_id}")));
            }
        }
    }

    async fn do_initiated(&self, transfer_id: &str) -> Result<TransferState> {
        let (from_ledger, to_ledger, from_account, to_account, asset, amount) = {
            let mut transfers = self.transfers.write().await;
            let record = transfers.get_mut(transfer_id).expect("checked by caller");
            record.transfer.status = TransferStatus::Routing;
            record.transfer.updated_at = current_time_ms();
            let step0 = &record.transfer.route[0];
            (
                step0.ledger_id.clone(),
                record.transfer.route.last().unwrap().ledger_id.clone(),
                record.transfer.from_account.id.clone(),
                record.transfer.to_account.id.clone(),
                record.transfer.asset.id.clone(),
                record.transfer.amount,
            )
        };
        self.publish_status(transfer_id, TransferStatus::Routing).await;

        match self.ledger.initiate_cross_ledger_transfer(&from_ledger, &to_ledger, &from_account, &to_account, &asset, amount).await {
            Ok(op) => {
                {
                    let mut transfers = self.transfers.write().await;
                    let record = transfers.get_mut(transfer_id).expect("checked by caller");
                    record.operation_id = Some(op.id.clone());
                    record.reservation_id = op.reservations.first().cloned();
                    record.transfer.route[0].status = RouteStepStatus::Executing;
                    record.transfer.status = TransferStatus::Executing;
                    record.state = TransferState::Leg1PrepareSent;
                }
                self.publish_status(transfer_id, TransferStatus::Executing).await;
                Ok(TransferState::Leg1PrepareSent)
            }
            Err(e) => self.fail(transfer_id, format!("failed to reserve source balance: {e}")).await,
        }
    }

    async fn do_leg1_prepare_sent(&self, transfer_id: &str) -> Result<TransferState> {
        let reservation_id = {
            let transfers = self.transfers.read().await;
            transfers.get(transfer_id).expect("checked by caller").reservation_id.clone()
        };
        let Some(reservation_id) = reservation_id else {
            return self.fail(transfer_id, "missing reservation id".into()).await;
        };

        match self.ledger.lock_reserved_balance(&reservation_id).await {
            Ok(tx_hash) => {
                let operation_id = {
                    let mut transfers = self.transfers.write().await;
                    let record = transfers.get_mut(transfer_id).expect("checked by caller");
                    record.transfer.route[0].status = RouteStepStatus::Completed;
                    record.transfer.route[0].tx_hash = Some(tx_hash);
                    record.state = TransferState::Leg1PrepareConfirmed;
                    record.operation_id.clone()
                };
                if let Some(op_id) = operation_id {
                    if let Err(e) = self.ledger.mark_operation_locked(&op_id).await {
                        warn!(transfer_id, operation_id = %op_id, error = %e, "failed to mark operation locked");
                    }
                }
                Ok(TransferState::Leg1PrepareConfirmed)
            }
            Err(e) => self.fail(transfer_id, format!("leg1 lock failed: {e}")).await,
        }
    }

    async fn do_leg1_prepare_confirmed(&self, transfer_id: &str) -> Result<TransferState> {
        let mut transfers = self.transfers.write().await;
        let record = transfers.get_mut(transfer_id).expect("checked by caller");
        let last = record.transfer.route.len() - 1;
        record.transfer.route[last].status = RouteStepStatus::Executing;
        record.state = TransferState::Leg2PrepareSent;
        Ok(TransferState::Leg2PrepareSent)
    }

    async fn do_leg2_prepare_sent(&self, transfer_id: &str) -> Result<TransferState> {
        let (from_ledger, to_ledger, from_account, to_account, asset, amount) = {
            let transfers = self.transfers.read().await;
            let record = transfers.get(transfer_id).expect("checked by caller");
            (
                record.transfer.route[0].ledger_id.clone(),
                record.transfer.route.last().unwrap().ledger_id.clone(),
                record.transfer.from_account.id.clone(),
                record.transfer.to_account.id.clone(),
                record.transfer.asset.id.clone(),
                record.transfer.amount,
            )
        };

        // Same-ledger transfers settle directly between the two accounts.
        // Cross-ledger legs emulate the minted credit via a per-ledger
        // bridge account, the same custody-emulation idea the adapter
        // contract uses for lock/unlock on ledgers without native freeze.
        let credit_source = if to_ledger == from_ledger { from_account.clone() } else { format!("bridge:{from_ledger}") };

        let to_adapter = match self.ledger.adapter(&to_ledger).await {
            Ok(adapter) => adapter,
            Err(e) => return self.fail(transfer_id, format!("leg2 adapter unavailable: {e}")).await,
        };

        match to_adapter.transfer(&credit_source, &to_account, &asset, amount).await {
            Ok(tx_hash) => {
                let mut transfers = self.transfers.write().await;
                let record = transfers.get_mut(transfer_id).expect("checked by caller");
                let last = record.transfer.route.len() - 1;
                record.transfer.route[last].status = RouteStepStatus::Completed;
                record.transfer.route[last].tx_hash = Some(tx_hash);
                record.state = TransferState::Leg2PrepareConfirmed;
                Ok(TransferState::Leg2PrepareConfirmed)
            }
            Err(e) => self.fail(transfer_id, format!("leg2 settlement failed: {e}")).await,
        }
    }

    async fn do_leg2_prepare_confirmed(&self, transfer_id: &str) -> Result<TransferState> {
        let mut transfers = self.transfers.write().await;
        let record = transfers.get_mut(transfer_id).expect("checked by caller");
        record.state = TransferState::CommitSent;
        Ok(TransferState::CommitSent)
    }

    async fn do_commit_sent(&self, transfer_id: &str) -> Result<TransferState> {
        let (reservation_id, operation_id) = {
            let transfers = self.transfers.read().await;
            let record = transfers.get(transfer_id).expect("checked by caller");
            (record.reservation_id.clone(), record.operation_id.clone())
        };

        if let Some(reservation_id) = &reservation_id {
            if let Err(e) = self.ledger.release_reservation(reservation_id, true).await {
                warn!(transfer_id, reservation_id, error = %e, "failed to release reservation on commit");
            }
        }
        if let Some(operation_id) = &operation_id {
            if let Err(e) = self.ledger.mark_operation_completed(operation_id).await {
                warn!(transfer_id, operation_id, error = %e, "failed to mark operation completed");
            }
        }

        let (from_account, to_account, asset, amount) = {
            let mut transfers = self.transfers.write().await;
            let record = transfers.get_mut(transfer_id).expect("checked by caller");
            let now = current_time_ms();
            record.transfer.status = TransferStatus::Completed;
            record.transfer.completed_at = Some(now);
            record.transfer.updated_at = now;
            record.state = TransferState::Completed;
            (record.transfer.from_account.id.clone(), record.transfer.to_account.id.clone(), record.transfer.asset.id.clone(), record.transfer.amount)
        };

        if let Some(processor) = &self.confirmation_processor {
            let input = ConfirmationInput { transfer_id: transfer_id.to_string(), from_account, to_account, asset_id: asset, amount };
            if let Err(e) = processor.add_task(input, Priority::Medium).await {
                warn!(transfer_id, error = %e, "failed to enqueue confirmation task");
            }
        }

        self.publish_status(transfer_id, TransferStatus::Completed).await;
        debug!(transfer_id, "transfer completed");
        Ok(TransferState::Completed)
    }

    async fn fail(&self, transfer_id: &str, reason: String) -> Result<TransferState> {
        warn!(transfer_id, reason = %reason, "transfer rolled back");
        let (reservation_id, operation_id) = {
            let mut transfers = self.transfers.write().await;
            let record = transfers.get_mut(transfer_id).expect("checked by caller");
            let now = current_time_ms();
            record.transfer.status = TransferStatus::Failed;
            record.transfer.updated_at = now;
            record.transfer.metadata.insert("failure_reason".to_string(), reason);
            for step in &mut record.transfer.route {
                if step.status == RouteStepStatus::Executing || step.status == RouteStepStatus::Pending {
                    step.status = RouteStepStatus::Failed;
                }
            }
            record.state = TransferState::Rollback;
            (record.reservation_id.clone(), record.operation_id.clone())
        };

        if let Some(operation_id) = &operation_id {
            if let Err(e) = self.ledger.rollback_cross_ledger_operation(operation_id).await {
                warn!(transfer_id, operation_id, error = %e, "rollback of cross-ledger operation failed");
            }
        } else if let Some(reservation_id) = &reservation_id {
            if let Err(e) = self.ledger.release_reservation(reservation_id, true).await {
                warn!(transfer_id, reservation_id, error = %e, "failed to release reservation during rollback");
            }
        }

        self.publish_status(transfer_id, TransferStatus::Failed).await;
        Ok(TransferState::Rollback)
    }

    /// Cancels a transfer from any non-terminal state (spec §3 invariant:
    /// cancelled is reachable from any non-terminal status). Releases
    /// whatever ledger hold the transfer had acquired, the same way
    /// `fail` does, but lands on `TransferStatus::Cancelled` instead of
    /// `Failed`.
    pub async fn cancel_transfer(&self, transfer_id: &str) -> Result<TransferState> {
        let (reservation_id, operation_id, already_terminal) = {
            let transfers = self.transfers.read().await;
            let record = transfers.get(transfer_id).ok_or_else(|| FinP2PError::Other(format!("transfer not found: {transfer_id}")))?;
            (record.reservation_id.clone(), record.operation_id.clone(), record.state.is_terminal())
        };
        if already_terminal {
            return Err(FinP2PError::InvalidTransition(format!("transfer {transfer_id} is already terminal")));
        }

        if let Some(operation_id) = &operation_id {
            if let Err(e) = self.ledger.rollback_cross_ledger_operation(operation_id).await {
                warn!(transfer_id, operation_id, error = %e, "rollback of cross-ledger operation failed during cancel");
            }
        } else if let Some(reservation_id) = &reservation_id {
            if let Err(e) = self.ledger.release_reservation(reservation_id, true).await {
                warn!(transfer_id, reservation_id, error = %e, "failed to release reservation during cancel");
            }
        }

        {
            let mut transfers = self.transfers.write().await;
            let record = transfers.get_mut(transfer_id).expect("checked above");
            record.transfer.status = TransferStatus::Cancelled;
            record.transfer.updated_at = current_time_ms();
            for step in &mut record.transfer.route {
                if step.status == RouteStepStatus::Executing || step.status == RouteStepStatus::Pending {
                    step.status = RouteStepStatus::Failed;
                }
            }
            record.state = TransferState::Rollback;
        }

        self.publish_status(transfer_id, TransferStatus::Cancelled).await;
        debug!(transfer_id, "transfer cancelled");
        Ok(TransferState::Rollback)
    }

    /// spec §4.6. Forces non-terminal transfers older than `ttlSecs` to
    /// `failed`/`Rollback`.
    pub async fn run_expiry_sweep(&self) -> usize {
        let now = current_time_ms();
        let ttl_ms = self.ttl_secs * 1000;
        let expired: Vec<String> = self
            .transfers
            .read()
            .await
            .iter()
            .filter(|(_, r)| !r.state.is_terminal() && now.saturating_sub(r.transfer.created_at) >= ttl_ms)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            let _ = self.fail(id, "transfer ttl expired".to_string()).await;
        }
        expired.len()
    }
}
