//! Key-value store abstraction (spec §6.2), unifying an in-memory backend
//! and Redis behind a single `Store` handle.

pub mod kv;
pub mod local;
pub mod redis_store;
pub mod store;

pub use kv::KvStore;
pub use local::LocalStore;
pub use redis_store::{RedisStore, RedisSubscription};
pub use store::{EventSubscription, Store, StoreBackend};

/// Key layout constants (spec §6.2).
pub mod keys {
    /// Cross-process transfer event bus topic (spec §9 design note).
    pub fn events(transfer_id: &str) -> String {
        format!("finp2p:events:{transfer_id}")
    }
    pub fn confirmations(router_id: &str) -> String {
        format!("finp2p:confirmations:{router_id}")
    }
    pub fn user_transactions(account_id: &str) -> String {
        format!("finp2p:user_transactions:{account_id}")
    }
    pub fn asset_transactions(asset_id: &str) -> String {
        format!("finp2p:asset_transactions:{asset_id}")
    }
    pub fn dual_confirmations(transfer_id: &str) -> String {
        format!("finp2p:dual_confirmations:{transfer_id}")
    }
    pub fn transfer_completion(transfer_id: &str) -> String {
        format!("finp2p:transfer_completion:{transfer_id}")
    }
    pub const ASSET_REGISTRY: &str = "finp2p:asset_registry";
    pub fn router_assets(router_id: &str) -> String {
        format!("finp2p:router_assets:{router_id}")
    }
    pub fn router_heartbeat(router_id: &str) -> String {
        format!("finp2p:router_heartbeat:{router_id}")
    }
    pub const ROUTING_TABLE: &str = "finp2p:routing:table";
}
