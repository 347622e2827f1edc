use async_trait::async_trait;
use finp2p_common::error::FinP2PError;
use finp2p_common::Result;
use futures_util::StreamExt;
use redis::AsyncCommands;

use crate::kv::KvStore;

/// A live Redis pub/sub subscription (spec §6.2, cross-process event bus).
/// Holds its own connection: pub/sub connections cannot be multiplexed
/// with regular command connections.
pub struct RedisSubscription {
    pubsub: redis::aio::PubSub,
}

impl RedisSubscription {
    /// Waits for the next message on the subscribed topic. Returns `None`
    /// once the connection is closed.
    pub async fn recv(&mut self) -> Option<String> {
        let msg = self.pubsub.on_message().next().await?;
        msg.get_payload().ok()
    }
}

/// Redis-backed store for multi-router deployments (grounded on
/// `atlas-mempool::core::mempool::redis::RedisMempool`: one client, a
/// fresh multiplexed connection per call, every redis error mapped into
/// the shared error enum).
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| FinP2PError::Store(e.to_string()))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| FinP2PError::Store(e.to_string()))
    }

    /// Subscribes to `topic` via `redis::aio::PubSub` (spec §9 design note:
    /// the cross-process event bus for multi-router deployments).
    pub async fn subscribe(&self, topic: &str) -> Result<RedisSubscription> {
        let conn = self.client.get_async_connection().await.map_err(|e| FinP2PError::Store(e.to_string()))?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(topic).await.map_err(|e| FinP2PError::Store(e.to_string()))?;
        Ok(RedisSubscription { pubsub })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.conn().await?;
        con.get(key).await.map_err(|e| FinP2PError::Store(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut con = self.conn().await?;
        con.set(key, value).await.map_err(|e| FinP2PError::Store(e.to_string()))
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut con = self.conn().await?;
        con.del(key).await.map_err(|e| FinP2PError::Store(e.to_string()))
    }

    async fn h_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut con = self.conn().await?;
        con.hset(key, field, value).await.map_err(|e| FinP2PError::Store(e.to_string()))
    }

    async fn h_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut con = self.conn().await?;
        con.hget(key, field).await.map_err(|e| FinP2PError::Store(e.to_string()))
    }

    async fn h_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let mut con = self.conn().await?;
        let map: std::collections::HashMap<String, String> =
            con.hgetall(key).await.map_err(|e| FinP2PError::Store(e.to_string()))?;
        Ok(map.into_iter().collect())
    }

    async fn h_del(&self, key: &str, field: &str) -> Result<()> {
        let mut con = self.conn().await?;
        con.hdel(key, field).await.map_err(|e| FinP2PError::Store(e.to_string()))
    }

    async fn s_add(&self, key: &str, member: &str) -> Result<()> {
        let mut con = self.conn().await?;
        con.sadd(key, member).await.map_err(|e| FinP2PError::Store(e.to_string()))
    }

    async fn s_rem(&self, key: &str, member: &str) -> Result<()> {
        let mut con = self.conn().await?;
        con.srem(key, member).await.map_err(|e| FinP2PError::Store(e.to_string()))
    }

    async fn s_members(&self, key: &str) -> Result<Vec<String>> {
        let mut con = self.conn().await?;
        con.smembers(key).await.map_err(|e| FinP2PError::Store(e.to_string()))
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let mut con = self.conn().await?;
        let _: i64 = con.publish(topic, payload).await.map_err(|e| FinP2PError::Store(e.to_string()))?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut con = self.conn().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut con)
            .await
            .map_err(|e| FinP2PError::Store(e.to_string()))?;
        Ok(())
    }
}
