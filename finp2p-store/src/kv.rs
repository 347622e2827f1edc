use async_trait::async_trait;
use finp2p_common::Result;

/// Uniform key-value store contract (spec §6.2). Both the `confirmations`
/// persistence layer (C4) and the authority registry (C3) are built on
/// top of this trait so either can run against an in-memory store (tests,
/// single-process deployments) or Redis (multi-router deployments)
/// without code changes.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;

    async fn h_set(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn h_get(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn h_get_all(&self, key: &str) -> Result<Vec<(String, String)>>;
    async fn h_del(&self, key: &str, field: &str) -> Result<()>;

    async fn s_add(&self, key: &str, member: &str) -> Result<()>;
    async fn s_rem(&self, key: &str, member: &str) -> Result<()>;
    async fn s_members(&self, key: &str) -> Result<Vec<String>>;

    /// Publishes `payload` on `topic`. Best-effort: no subscriber is not an
    /// error (mirrors Redis pub/sub semantics).
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
