use std::collections::HashMap;

use finp2p_common::time::current_time_ms;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// spec §3: `RouterInfo.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterStatus {
    Online,
    Offline,
    Maintenance,
}

/// A peer entry in the network topology (spec §3: `RouterInfo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterInfo {
    pub id: String,
    pub endpoint: String,
    /// Hex-encoded Ed25519 verifying key.
    pub public_key: String,
    pub supported_ledgers: Vec<String>,
    pub status: RouterStatus,
    pub last_seen: u64,
}

impl RouterInfo {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, public_key: impl Into<String>, supported_ledgers: Vec<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            public_key: public_key.into(),
            supported_ledgers,
            status: RouterStatus::Offline,
            last_seen: 0,
        }
    }
}

/// The network topology owned by the Router Core (spec §3, §4.7): peer
/// roster and adjacency, refreshed on heartbeat. Mutations serialize on
/// the roster's single lock, matching the "owned by the Router Core"
/// ownership rule (spec §3).
#[derive(Default)]
pub struct PeerRoster {
    peers: RwLock<HashMap<String, RouterInfo>>,
}

impl PeerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_peer(&self, mut info: RouterInfo) {
        info.last_seen = current_time_ms();
        info.status = RouterStatus::Online;
        debug!(router_id = %info.id, "peer added");
        self.peers.write().await.insert(info.id.clone(), info);
    }

    pub async fn remove_peer(&self, router_id: &str) -> Option<RouterInfo> {
        self.peers.write().await.remove(router_id)
    }

    pub async fn get(&self, router_id: &str) -> Option<RouterInfo> {
        self.peers.read().await.get(router_id).cloned()
    }

    pub async fn list(&self) -> Vec<RouterInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Refreshes `last_seen`/`status` for `router_id` on receipt of a
    /// `HEARTBEAT` message (spec §4.7).
    pub async fn mark_heartbeat(&self, router_id: &str) {
        let mut peers = self.peers.write().await;
        if let Some(info) = peers.get_mut(router_id) {
            info.last_seen = current_time_ms();
            info.status = RouterStatus::Online;
        }
    }

    /// Marks peers whose last heartbeat is older than `stale_after_ms` as
    /// offline. Called from the periodic heartbeat task.
    pub async fn mark_stale_offline(&self, stale_after_ms: u64) {
        let now = current_time_ms();
        let mut peers = self.peers.write().await;
        for info in peers.values_mut() {
            if info.status == RouterStatus::Online && now.saturating_sub(info.last_seen) > stale_after_ms {
                info.status = RouterStatus::Offline;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let roster = PeerRoster::new();
        roster.add_peer(RouterInfo::new("router-b", "https://b.example.com", "aa", vec!["mock".into()])).await;
        let info = roster.get("router-b").await.unwrap();
        assert_eq!(info.status, RouterStatus::Online);
    }

    #[tokio::test]
    async fn remove_peer_drops_it_from_the_roster() {
        let roster = PeerRoster::new();
        roster.add_peer(RouterInfo::new("router-b", "https://b.example.com", "aa", vec![])).await;
        roster.remove_peer("router-b").await;
        assert!(roster.get("router-b").await.is_none());
    }

    #[tokio::test]
    async fn stale_peer_is_marked_offline() {
        let roster = PeerRoster::new();
        roster.add_peer(RouterInfo::new("router-b", "https://b.example.com", "aa", vec![])).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        roster.mark_stale_offline(10).await;
        assert_eq!(roster.get("router-b").await.unwrap().status, RouterStatus::Offline);
    }

    #[tokio::test]
    async fn heartbeat_clears_stale_status() {
        let roster = PeerRoster::new();
        roster.add_peer(RouterInfo::new("router-b", "https://b.example.com", "aa", vec![])).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        roster.mark_stale_offline(10).await;
        roster.mark_heartbeat("router-b").await;
        assert_eq!(roster.get("router-b").await.unwrap().status, RouterStatus::Online);
    }
}
