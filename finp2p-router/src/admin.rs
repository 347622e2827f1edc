use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::roster::RouterInfo;
use crate::router::RouterCore;

/// Minimal read-only admin surface (SPEC_FULL.md §10), grounded on
/// `atlas_node::api::rest::start_rest_api`. Deliberately narrow: router
/// health, peer roster, in-flight transfer count — not the general REST
/// surface `spec.md` §1 places out of scope.
#[derive(Clone)]
pub struct AdminState {
    pub core: Arc<RouterCore>,
    pub prometheus: Option<PrometheusHandle>,
}

#[derive(Serialize)]
struct HealthResponse {
    router_id: String,
    running: bool,
}

#[derive(Serialize)]
struct TransferCountResponse {
    active: usize,
    confirmation_pending: usize,
    confirmation_active: usize,
}

pub fn build_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/peers", get(peers))
        .route("/transfers/active", get(active_transfers))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn start_admin_server(host: &str, port: u16, state: AdminState) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    info!(%addr, "admin HTTP surface listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

async fn health(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(HealthResponse { router_id: state.core.router_id.clone(), running: state.core.is_running() })
}

async fn peers(State(state): State<AdminState>) -> Json<Vec<RouterInfo>> {
    Json(state.core.roster.list().await)
}

async fn active_transfers(State(state): State<AdminState>) -> Json<TransferCountResponse> {
    Json(TransferCountResponse {
        active: state.core.transfer_manager.active_count().await,
        confirmation_pending: state.core.confirmation_processor.pending_count().await,
        confirmation_active: state.core.confirmation_processor.active_count().await,
    })
}

async fn metrics(State(state): State<AdminState>) -> String {
    state.prometheus.as_ref().map(|h| h.render()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use finp2p_authority::PrimaryRouterAuthority;
    use finp2p_common::crypto::RouterSigner;
    use finp2p_confirmation::{ConfirmationRecordStore, ParallelConfirmationProcessor, ProcessorConfig};
    use finp2p_ledger::{LedgerManager, MockAdapter};
    use finp2p_store::Store;
    use finp2p_transfer::TransferManager;
    use tower::ServiceExt;

    async fn test_state() -> AdminState {
        let store = Store::local();
        let authority = Arc::new(PrimaryRouterAuthority::new(store.clone(), "router-a"));
        let ledger = Arc::new(LedgerManager::with_default_timeout());
        ledger.register_adapter(Arc::new(MockAdapter::new("mock"))).await;
        let confirmation_store = Arc::new(ConfirmationRecordStore::new(store, "router-a", RouterSigner::generate()));
        let processor = Arc::new(ParallelConfirmationProcessor::new(confirmation_store, ProcessorConfig::default()));
        let transfer_manager = Arc::new(TransferManager::new("router-a", ledger.clone()));
        let core = Arc::new(RouterCore::new(
            "router-a",
            RouterSigner::generate(),
            authority,
            ledger,
            processor,
            transfer_manager,
            crate::router::RouterConfig::default(),
        ));
        AdminState { core, prometheus: None }
    }

    #[tokio::test]
    async fn health_endpoint_reports_router_id() {
        let state = test_state().await;
        let app = build_router(state);
        let response = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn peers_endpoint_lists_roster() {
        let state = test_state().await;
        state.core.add_peer(RouterInfo::new("router-b", "https://b.example.com", "aa", vec!["mock".into()])).await;
        let app = build_router(state);
        let response = app.oneshot(Request::builder().uri("/peers").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
