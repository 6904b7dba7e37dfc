use crate::error::{CoordinatorError, Result};
use crate::secret::Secret;
use async_trait::async_trait;
use futures::stream::BoxStream;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Typed façade over the key-value + pub/sub store. Expressed as a trait so
/// the registry, command bus, and event bus can be exercised against a
/// deterministic in-memory fake in tests without a live Redis server.
///
/// All composite values are UTF-8 JSON; the register/freeze/unfreeze
/// triplets are pipelined so set mutation and status-hash update land in a
/// single atomic round trip.
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    async fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;
    async fn hgetall(&self, key: &str) -> Result<std::collections::HashMap<String, String>>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn setex(&self, key: &str, ttl_secs: u64, value: String) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn del(&self, key: &str) -> Result<()>;

    async fn rpush(&self, key: &str, value: String) -> Result<()>;
    async fn lpop(&self, key: &str) -> Result<Option<String>>;

    async fn publish(&self, channel: &str, payload: String) -> Result<()>;

    /// Subscribes to a channel, returning a stream of raw message payloads.
    /// Best-effort: the stream ends if the underlying connection drops: the
    /// caller is expected to reconcile by reading state directly on
    /// reconnect, per the event bus's best-effort delivery contract.
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>>;

    /// Atomically: remove `member` from `remove_set`, add it to `add_set`
    /// (either may be skipped by passing the same key to both with a no-op
    /// semantic at the call site), and set the given hash fields — all in
    /// one pipelined transaction. This is the primitive register/freeze/
    /// unfreeze build on top of.
    async fn pipelined_set_move_and_hset(
        &self,
        remove_set: Option<(&str, &str)>,
        add_set: Option<(&str, &str)>,
        hash_key: &str,
        fields: &[(&str, String)],
    ) -> Result<()>;
}

/// Production implementation backed by a pooled, auto-reconnecting async
/// Redis connection.
#[derive(Clone)]
pub struct RedisCoordinatorClient {
    manager: ConnectionManager,
    redis_url: Secret<String>,
}

impl RedisCoordinatorClient {
    pub async fn connect(redis_url: &Secret<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url.expose_secret().as_str())
            .map_err(CoordinatorError::from)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(CoordinatorError::from)?;
        Ok(Self {
            manager,
            redis_url: redis_url.clone(),
        })
    }
}

#[async_trait]
impl CoordinatorClient for RedisCoordinatorClient {
    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.sadd::<_, _, ()>(key, member).await.map_err(CoordinatorError::from)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.srem::<_, _, ()>(key, member).await.map_err(CoordinatorError::from)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        conn.smembers(key).await.map_err(CoordinatorError::from)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        conn.sismember(key, member).await.map_err(CoordinatorError::from)
    }

    async fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut conn = self.manager.clone();
        let items: Vec<(&str, String)> = fields.to_vec();
        conn.hset_multiple::<_, _, _, ()>(key, &items).await.map_err(CoordinatorError::from)
    }

    async fn hgetall(&self, key: &str) -> Result<std::collections::HashMap<String, String>> {
        let mut conn = self.manager.clone();
        conn.hgetall(key).await.map_err(CoordinatorError::from)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.hget(key, field).await.map_err(CoordinatorError::from)
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: String) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await.map_err(CoordinatorError::from)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(CoordinatorError::from)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        conn.exists(key).await.map_err(CoordinatorError::from)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await.map_err(CoordinatorError::from)
    }

    async fn rpush(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.rpush::<_, _, ()>(key, value).await.map_err(CoordinatorError::from)
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.lpop(key, None).await.map_err(CoordinatorError::from)
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.publish::<_, _, ()>(channel, payload).await.map_err(CoordinatorError::from)
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>> {
        use futures::StreamExt;

        let client = redis::Client::open(self.redis_url.expose_secret().as_str())
            .map_err(CoordinatorError::from)?;
        let mut pubsub = client.get_async_pubsub().await.map_err(CoordinatorError::from)?;
        pubsub.subscribe(channel).await.map_err(CoordinatorError::from)?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
        Ok(Box::pin(stream))
    }

    async fn pipelined_set_move_and_hset(
        &self,
        remove_set: Option<(&str, &str)>,
        add_set: Option<(&str, &str)>,
        hash_key: &str,
        fields: &[(&str, String)],
    ) -> Result<()> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some((key, member)) = remove_set {
            pipe.srem(key, member);
        }
        if let Some((key, member)) = add_set {
            pipe.sadd(key, member);
        }
        let items: Vec<(&str, String)> = fields.to_vec();
        pipe.hset_multiple(hash_key, &items);
        pipe.query_async::<_, ()>(&mut conn).await.map_err(CoordinatorError::from)
    }
}

