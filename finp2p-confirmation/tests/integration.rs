use std::sync::Arc;
use std::time::Duration;

use finp2p_common::crypto::RouterSigner;
use finp2p_confirmation::{ConfirmationInput, ConfirmationRecordStore, ConfirmationStatus, DualStatus, ParallelConfirmationProcessor, Priority, ProcessorConfig};
use finp2p_store::Store;

fn input(transfer_id: &str) -> ConfirmationInput {
    ConfirmationInput {
        transfer_id: transfer_id.to_string(),
        from_account: "alice".into(),
        to_account: "bob".into(),
        asset_id: "asset-1".into(),
        amount: 50,
    }
}

/// Scenario S4 (spec §8): a transfer confirmed independently by its two
/// participating routers converges to `dual_confirmed`, and regulatory
/// reporting sees the confirmed volume on the reporting router's own side.
#[tokio::test]
async fn dual_confirmation_across_two_routers_and_reporting() {
    let shared = Store::local();
    let router_a = ConfirmationRecordStore::new(shared.clone(), "router-a", RouterSigner::generate());
    let router_b = ConfirmationRecordStore::new(shared, "router-b", RouterSigner::generate());

    router_a.create_confirmation_record(&input("t1"), ConfirmationStatus::Confirmed, Some("0xabc".into())).await.unwrap();
    assert_eq!(router_a.get_dual_status("t1").await.unwrap().status, DualStatus::PartialConfirmed);

    router_b.create_confirmation_record(&input("t1"), ConfirmationStatus::Confirmed, Some("0xdef".into())).await.unwrap();
    let dual = router_a.get_dual_status("t1").await.unwrap();
    assert_eq!(dual.status, DualStatus::DualConfirmed);
    assert_eq!(dual.confirmations.len(), 2);

    let report = router_a.generate_regulatory_report(0, u64::MAX).await.unwrap();
    assert_eq!(report.total_confirmations, 1);
    assert_eq!(report.volume_by_asset.get("asset-1"), Some(&50));
}

/// Scenario S5 (spec §8): the processor drains a mixed-priority backlog
/// and every task eventually reaches a terminal result.
#[tokio::test]
async fn processor_drains_backlog_to_terminal_results() {
    let store = Arc::new(ConfirmationRecordStore::new(Store::local(), "router-a", RouterSigner::generate()));
    let processor = ParallelConfirmationProcessor::new(store, ProcessorConfig { max_concurrency: 2, batch_size: 2, ..ProcessorConfig::default() });

    let mut ids = Vec::new();
    for i in 0..6 {
        let priority = match i % 3 {
            0 => Priority::High,
            1 => Priority::Medium,
            _ => Priority::Low,
        };
        ids.push(processor.add_task(input(&format!("t{i}")), priority).await.unwrap());
    }

    for _ in 0..200 {
        let mut all_done = true;
        for id in &ids {
            if processor.get_result(id).await.is_none() {
                all_done = false;
                break;
            }
        }
        if all_done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for id in &ids {
        let result = processor.get_result(id).await.expect("task should have completed");
        assert!(matches!(result.outcome, finp2p_confirmation::ConfirmationOutcome::Success { .. }));
    }
}
