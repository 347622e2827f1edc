use std::sync::Arc;

use finp2p_ledger::{LedgerAdapter, LedgerManager, MockAdapter};

/// Scenario S3 (spec §8): cross-ledger rollback end to end, through the
/// public `LedgerManager` API only.
#[tokio::test]
async fn cross_ledger_transfer_rollback_scenario() {
    let manager = LedgerManager::new(300);
    let adapter = Arc::new(MockAdapter::new("mock"));
    adapter.mint("a", "usd", 15).await;
    let adapter: Arc<dyn LedgerAdapter> = adapter;
    manager.register_adapter(adapter).await;

    let op = manager
        .initiate_cross_ledger_transfer("mock", "mock", "a", "b", "usd", 15)
        .await
        .expect("operation should be created");
    assert_eq!(op.reservations.len(), 1);
    assert_eq!(op.status, finp2p_ledger::OperationStatus::Pending);

    manager.rollback_cross_ledger_operation(&op.id).await.expect("rollback should succeed");
    let after = manager.get_operation(&op.id).await.unwrap();
    assert_eq!(after.status, finp2p_ledger::OperationStatus::RolledBack);
    assert_eq!(manager.get_reserved_amount("mock", "a", "usd").await, 0);
}

#[tokio::test]
async fn reservation_queue_serves_requests_in_order() {
    let manager = Arc::new(LedgerManager::new(300));
    let adapter = Arc::new(MockAdapter::new("mock"));
    adapter.mint("a", "usd", 1000).await;
    manager.register_adapter(adapter).await;

    // 20 concurrent requests of 10 each against a balance of 1000: all
    // must succeed, none oversubscribed (spec §8 invariant 1).
    let mut handles = Vec::new();
    for _ in 0..20 {
        let m = Arc::clone(&manager);
        handles.push(tokio::spawn(async move { m.reserve_balance("mock", "a", "usd", 10).await }));
    }
    for h in handles {
        h.await.unwrap().expect("each reservation should succeed within balance");
    }
    assert_eq!(manager.get_reserved_amount("mock", "a", "usd").await, 200);
}
