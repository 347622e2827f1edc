use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use finp2p_common::Result;
use tokio::sync::{broadcast, RwLock};

use crate::kv::KvStore;

/// In-memory backend for tests and single-process deployments (grounded on
/// `atlas-mempool::core::mempool::local::LocalMempool`'s `RwLock<HashMap>`
/// shape).
#[derive(Clone)]
pub struct LocalStore {
    strings: Arc<RwLock<HashMap<String, String>>>,
    hashes: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
    sets: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            strings: Arc::new(RwLock::new(HashMap::new())),
            hashes: Arc::new(RwLock::new(HashMap::new())),
            sets: Arc::new(RwLock::new(HashMap::new())),
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribes to a topic, creating its broadcast channel on first use.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(128).0)
            .subscribe()
    }
}

#[async_trait]
impl KvStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.strings.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.strings.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.strings.write().await.remove(key);
        Ok(())
    }

    async fn h_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hashes
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn h_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .hashes
            .read()
            .await
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn h_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .hashes
            .read()
            .await
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn h_del(&self, key: &str, field: &str) -> Result<()> {
        if let Some(h) = self.hashes.write().await.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn s_add(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn s_rem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(s) = self.sets.write().await.get_mut(key) {
            s.remove(member);
        }
        Ok(())
    }

    async fn s_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .read()
            .await
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let topics = self.topics.read().await;
        if let Some(sender) = topics.get(topic) {
            // No subscribers is not an error; broadcast::send fails only
            // when there are zero receivers, which we deliberately ignore.
            let _ = sender.send(payload.to_string());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
