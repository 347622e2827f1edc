use finp2p_common::identity::{FinId, FinIdKind};
use finp2p_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::envelope::{MessageType, RouterMessage};
use crate::roster::RouterInfo;
use crate::router::RouterCore;

/// `TRANSFER_REQUEST` payload shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequestPayload {
    from_account: String,
    to_account: String,
    asset: String,
    from_ledger: String,
    to_ledger: String,
    amount: u128,
    #[serde(default = "default_domain")]
    domain: String,
}

fn default_domain() -> String {
    "finp2p.local".to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponsePayload {
    transfer_id: String,
    status: String,
    reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteResponsePayload {
    router_id: String,
    supported_ledgers: Vec<String>,
}

/// Verifies and routes a single inbound message to its handler (spec
/// §4.7). Callers (`RouterCore::receive`) have already checked the
/// signature and ttl.
pub async fn dispatch(core: &RouterCore, message: RouterMessage) -> Result<Option<RouterMessage>> {
    match message.message_type {
        MessageType::Heartbeat => {
            // Roster freshness is already updated by `RouterCore::receive`
            // before dispatch; nothing further to do for a bare heartbeat.
            Ok(None)
        }
        MessageType::TransferRequest => handle_transfer_request(core, message).await,
        MessageType::TransferResponse => {
            info!(from = %message.from_router, "received transfer response");
            Ok(None)
        }
        MessageType::RouteDiscovery => handle_route_discovery(core, message).await,
        MessageType::RouteResponse => {
            info!(from = %message.from_router, "received route response");
            Ok(None)
        }
        MessageType::Error => {
            warn!(from = %message.from_router, payload = %message.payload, "received error message from peer");
            Ok(None)
        }
        MessageType::Unknown => {
            warn!(from = %message.from_router, "ignoring unknown message type");
            Ok(None)
        }
    }
}

async fn handle_transfer_request(core: &RouterCore, message: RouterMessage) -> Result<Option<RouterMessage>> {
    let request: TransferRequestPayload = match serde_json::from_value(message.payload.clone()) {
        Ok(req) => req,
        Err(e) => {
            warn!(from = %message.from_router, error = %e, "malformed transfer request payload");
            let payload = json!({"error": format!("malformed transfer request: {e}")});
            return Ok(Some(core.sign_message(MessageType::Error, message.from_router.as_str(), payload)?));
        }
    };

    let from_account = FinId::new(request.from_account, FinIdKind::Account, &request.domain);
    let to_account = FinId::new(request.to_account, FinIdKind::Account, &request.domain);
    let asset = FinId::new(request.asset, FinIdKind::Asset, &request.domain);

    let transfer = core
        .transfer_manager
        .initiate_transfer(from_account, to_account, asset, request.from_ledger, request.to_ledger, request.amount)
        .await?;
    let finished = core.transfer_manager.execute_transfer(&transfer.id).await?;

    let response = TransferResponsePayload {
        transfer_id: finished.id.clone(),
        status: format!("{:?}", finished.status),
        reason: finished.metadata.get("failure_reason").cloned(),
    };
    let payload = serde_json::to_value(response).map_err(|e| finp2p_common::FinP2PError::Other(format!("failed to serialize transfer response: {e}")))?;
    Ok(Some(core.sign_message(MessageType::TransferResponse, message.from_router.as_str(), payload)?))
}

async fn handle_route_discovery(core: &RouterCore, message: RouterMessage) -> Result<Option<RouterMessage>> {
    let supported_ledgers: Vec<String> = core.roster.list().await.into_iter().flat_map(|p: RouterInfo| p.supported_ledgers).collect();
    let response = RouteResponsePayload { router_id: core.router_id.clone(), supported_ledgers };
    let payload = serde_json::to_value(response).map_err(|e| finp2p_common::FinP2PError::Other(format!("failed to serialize route response: {e}")))?;
    Ok(Some(core.sign_message(MessageType::RouteResponse, message.from_router.as_str(), payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use finp2p_authority::PrimaryRouterAuthority;
    use finp2p_common::crypto::RouterSigner;
    use finp2p_confirmation::{ConfirmationRecordStore, ParallelConfirmationProcessor, ProcessorConfig};
    use finp2p_ledger::{LedgerManager, MockAdapter};
    use finp2p_store::Store;
    use finp2p_transfer::TransferManager;
    use std::sync::Arc;

    async fn test_core() -> Arc<RouterCore> {
        let store = Store::local();
        let authority = Arc::new(PrimaryRouterAuthority::new(store.clone(), "router-a"));
        let ledger = Arc::new(LedgerManager::with_default_timeout());
        let adapter = Arc::new(MockAdapter::new("mock"));
        adapter.mint("alice", "usd", 100).await;
        ledger.register_adapter(adapter).await;
        let confirmation_store = Arc::new(ConfirmationRecordStore::new(store, "router-a", RouterSigner::generate()));
        let processor = Arc::new(ParallelConfirmationProcessor::new(confirmation_store, ProcessorConfig::default()));
        let transfer_manager = Arc::new(TransferManager::new("router-a", ledger.clone()));
        Arc::new(RouterCore::new(
            "router-a",
            RouterSigner::generate(),
            authority,
            ledger,
            processor,
            transfer_manager,
            crate::router::RouterConfig::default(),
        ))
    }

    #[tokio::test]
    async fn transfer_request_dispatches_and_responds_completed() {
        let core = test_core().await;
        let peer_signer = RouterSigner::generate();
        core.add_peer(RouterInfo::new("router-b", "https://b.example.com", hex::encode(peer_signer.verifying_key().to_bytes()), vec!["mock".into()])).await;

        let payload = json!({
            "fromAccount": "alice", "toAccount": "bob", "asset": "usd",
            "fromLedger": "mock", "toLedger": "mock", "amount": 10,
        });
        let msg = RouterMessage::sign(&peer_signer, MessageType::TransferRequest, "router-b", "router-a", payload, 30_000).unwrap();

        let response = core.receive(msg).await.unwrap().expect("expected a response");
        assert_eq!(response.message_type, MessageType::TransferResponse);
        assert_eq!(response.payload["status"], "Completed");
    }

    #[tokio::test]
    async fn malformed_transfer_request_yields_error_response() {
        let core = test_core().await;
        let peer_signer = RouterSigner::generate();
        core.add_peer(RouterInfo::new("router-b", "https://b.example.com", hex::encode(peer_signer.verifying_key().to_bytes()), vec!["mock".into()])).await;

        let payload = json!({"garbage": true});
        let msg = RouterMessage::sign(&peer_signer, MessageType::TransferRequest, "router-b", "router-a", payload, 30_000).unwrap();
        let response = core.receive(msg).await.unwrap().expect("expected an error response");
        assert_eq!(response.message_type, MessageType::Error);
    }

    #[tokio::test]
    async fn route_discovery_returns_supported_ledgers() {
        let core = test_core().await;
        let peer_signer = RouterSigner::generate();
        core.add_peer(RouterInfo::new("router-b", "https://b.example.com", hex::encode(peer_signer.verifying_key().to_bytes()), vec!["mock".into()])).await;

        let msg = RouterMessage::sign(&peer_signer, MessageType::RouteDiscovery, "router-b", "router-a", json!({}), 30_000).unwrap();
        let response = core.receive(msg).await.unwrap().expect("expected a route response");
        assert_eq!(response.message_type, MessageType::RouteResponse);
    }
}
