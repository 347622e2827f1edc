use finp2p_common::Result;

use crate::kv::KvStore;
use crate::local::LocalStore;
use crate::redis_store::{RedisStore, RedisSubscription};

/// A live subscription to a topic (spec §9 design note: event bus), either
/// backend. Callers `.recv().await` in a loop without caring which
/// backend is live.
pub enum EventSubscription {
    Local(tokio::sync::broadcast::Receiver<String>),
    Redis(RedisSubscription),
}

impl EventSubscription {
    pub async fn recv(&mut self) -> Option<String> {
        match self {
            EventSubscription::Local(rx) => rx.recv().await.ok(),
            EventSubscription::Redis(sub) => sub.recv().await,
        }
    }
}

/// Store backend strategy (grounded on
/// `atlas-mempool::core::mempool::MempoolBackend`).
#[derive(Clone)]
pub enum StoreBackend {
    Local(LocalStore),
    Redis(RedisStore),
}

/// Unified key-value store handle. Dispatches to whichever backend was
/// configured, so C3/C4 code is written once against `Store` and never
/// needs to know which backend is live.
#[derive(Clone)]
pub struct Store {
    backend: StoreBackend,
}

impl Store {
    /// If `redis_url` is `Some`, connects to Redis; otherwise uses an
    /// in-memory store.
    pub fn new(redis_url: Option<&str>) -> Result<Self> {
        match redis_url {
            Some(url) => Ok(Self {
                backend: StoreBackend::Redis(RedisStore::new(url)?),
            }),
            None => Ok(Self {
                backend: StoreBackend::Local(LocalStore::new()),
            }),
        }
    }

    pub fn local() -> Self {
        Self {
            backend: StoreBackend::Local(LocalStore::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        match &self.backend {
            StoreBackend::Local(s) => s.get(key).await,
            StoreBackend::Redis(s) => s.get(key).await,
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        match &self.backend {
            StoreBackend::Local(s) => s.set(key, value).await,
            StoreBackend::Redis(s) => s.set(key, value).await,
        }
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        match &self.backend {
            StoreBackend::Local(s) => s.del(key).await,
            StoreBackend::Redis(s) => s.del(key).await,
        }
    }

    pub async fn h_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        match &self.backend {
            StoreBackend::Local(s) => s.h_set(key, field, value).await,
            StoreBackend::Redis(s) => s.h_set(key, field, value).await,
        }
    }

    pub async fn h_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        match &self.backend {
            StoreBackend::Local(s) => s.h_get(key, field).await,
            StoreBackend::Redis(s) => s.h_get(key, field).await,
        }
    }

    pub async fn h_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        match &self.backend {
            StoreBackend::Local(s) => s.h_get_all(key).await,
            StoreBackend::Redis(s) => s.h_get_all(key).await,
        }
    }

    pub async fn h_del(&self, key: &str, field: &str) -> Result<()> {
        match &self.backend {
            StoreBackend::Local(s) => s.h_del(key, field).await,
            StoreBackend::Redis(s) => s.h_del(key, field).await,
        }
    }

    pub async fn s_add(&self, key: &str, member: &str) -> Result<()> {
        match &self.backend {
            StoreBackend::Local(s) => s.s_add(key, member).await,
            StoreBackend::Redis(s) => s.s_add(key, member).await,
        }
    }

    pub async fn s_rem(&self, key: &str, member: &str) -> Result<()> {
        match &self.backend {
            StoreBackend::Local(s) => s.s_rem(key, member).await,
            StoreBackend::Redis(s) => s.s_rem(key, member).await,
        }
    }

    pub async fn s_members(&self, key: &str) -> Result<Vec<String>> {
        match &self.backend {
            StoreBackend::Local(s) => s.s_members(key).await,
            StoreBackend::Redis(s) => s.s_members(key).await,
        }
    }

    pub async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        match &self.backend {
            StoreBackend::Local(s) => s.publish(topic, payload).await,
            StoreBackend::Redis(s) => s.publish(topic, payload).await,
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match &self.backend {
            StoreBackend::Local(s) => s.ping().await,
            StoreBackend::Redis(s) => s.ping().await,
        }
    }

    /// Subscribes to `topic` (spec §9 design note: cross-process event
    /// bus). `Local` subscribes on an in-process broadcast channel;
    /// `Redis` opens a dedicated `redis::aio::PubSub` connection.
    pub async fn subscribe(&self, topic: &str) -> Result<EventSubscription> {
        match &self.backend {
            StoreBackend::Local(s) => Ok(EventSubscription::Local(s.subscribe(topic).await)),
            StoreBackend::Redis(s) => Ok(EventSubscription::Redis(s.subscribe(topic).await?)),
        }
    }
}
