use std::sync::Arc;

use finp2p_authority::PrimaryRouterAuthority;
use finp2p_common::crypto::RouterSigner;
use finp2p_confirmation::{ConfirmationRecordStore, ParallelConfirmationProcessor, ProcessorConfig};
use finp2p_ledger::{LedgerManager, MockAdapter};
use finp2p_router::{MessageType, RouterConfig, RouterCore, RouterInfo, RouterMessage};
use finp2p_store::Store;
use finp2p_transfer::TransferManager;
use serde_json::json;

async fn build_core(router_id: &str, store: Store, signer: RouterSigner) -> Arc<RouterCore> {
    let authority = Arc::new(PrimaryRouterAuthority::new(store.clone(), router_id));
    let ledger = Arc::new(LedgerManager::with_default_timeout());
    let adapter = Arc::new(MockAdapter::new("mock"));
    adapter.mint("alice", "usd", 100).await;
    ledger.register_adapter(adapter).await;
    let confirmation_store = Arc::new(ConfirmationRecordStore::new(store, router_id, RouterSigner::generate()));
    let processor = Arc::new(ParallelConfirmationProcessor::new(confirmation_store, ProcessorConfig::default()));
    let transfer_manager = Arc::new(TransferManager::new(router_id, ledger.clone()));
    Arc::new(RouterCore::new(router_id, signer, authority, ledger, processor, transfer_manager, RouterConfig::default()))
}

/// End-to-end: router B sends a signed `TRANSFER_REQUEST` to router A,
/// which executes the transfer against its own ledger and signs back a
/// `TRANSFER_RESPONSE` reporting completion.
#[tokio::test]
async fn transfer_request_round_trip_between_two_routers() {
    let store = Store::local();
    let signer_a = RouterSigner::generate();
    let signer_b = RouterSigner::generate();

    let core_a = build_core("router-a", store.clone(), signer_a.clone()).await;
    core_a
        .add_peer(RouterInfo::new("router-b", "https://b.example.com", hex::encode(signer_b.verifying_key().to_bytes()), vec!["mock".into()]))
        .await;

    let request = json!({
        "fromAccount": "alice", "toAccount": "bob", "asset": "usd",
        "fromLedger": "mock", "toLedger": "mock", "amount": 25,
    });
    let envelope = RouterMessage::sign(&signer_b, MessageType::TransferRequest, "router-b", "router-a", request, 30_000).unwrap();

    let response = core_a.receive(envelope).await.unwrap().expect("router-a should respond");
    assert_eq!(response.message_type, MessageType::TransferResponse);
    assert_eq!(response.payload["status"], "Completed");
    response.verify(&signer_a.verifying_key()).unwrap();
}

#[tokio::test]
async fn lifecycle_start_stop_start_is_safe() {
    let store = Store::local();
    let core = build_core("router-a", store, RouterSigner::generate()).await;
    core.start().await;
    assert!(core.is_running());
    core.stop().await;
    assert!(!core.is_running());
    core.start().await;
    assert!(core.is_running());
    core.stop().await;
}

#[tokio::test]
async fn expired_message_never_reaches_the_dispatcher() {
    let store = Store::local();
    let signer_a = RouterSigner::generate();
    let signer_b = RouterSigner::generate();
    let core_a = build_core("router-a", store, signer_a).await;
    core_a
        .add_peer(RouterInfo::new("router-b", "https://b.example.com", hex::encode(signer_b.verifying_key().to_bytes()), vec!["mock".into()]))
        .await;

    let mut envelope = RouterMessage::sign(&signer_b, MessageType::TransferRequest, "router-b", "router-a", json!({}), 5).unwrap();
    envelope.timestamp = envelope.timestamp.saturating_sub(1_000);

    let response = core_a.receive(envelope).await.unwrap();
    assert!(response.is_none());
}
