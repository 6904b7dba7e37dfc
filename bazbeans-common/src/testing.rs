//! Deterministic in-memory stand-in for `CoordinatorClient`, used by this
//! crate's own tests and by the agent/proxy-updater integration tests. Only
//! compiled with the `test-util` feature.

use crate::coordinator::CoordinatorClient;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::broadcast;

struct Store {
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    strings: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    published: Vec<(String, String)>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            sets: HashMap::new(),
            hashes: HashMap::new(),
            strings: HashMap::new(),
            lists: HashMap::new(),
            published: Vec::new(),
        }
    }
}

/// An in-memory coordinator with no TTL expiry semantics (tests that need
/// TTL expiry drive it explicitly via `expire_now`).
pub struct FakeCoordinator {
    store: Mutex<Store>,
    broadcast: broadcast::Sender<(String, String)>,
}

impl FakeCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            store: Mutex::new(Store::default()),
            broadcast: tx,
        }
    }

    /// Simulate TTL expiry for a string key (used to exercise stale-heartbeat
    /// cleanup paths deterministically, without sleeping in tests).
    pub fn expire_now(&self, key: &str) {
        self.store.lock().unwrap().strings.remove(key);
    }

    pub fn published_events(&self) -> Vec<(String, String)> {
        self.store.lock().unwrap().published.clone()
    }
}

impl Default for FakeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinatorClient for FakeCoordinator {
    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.store
            .lock()
            .unwrap()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(set) = self.store.lock().unwrap().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .sets
            .get(key)
            .map(|s| s.contains(member))
            .unwrap_or(false))
    }

    async fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let entry = self.store.lock().unwrap().hashes.entry(key.to_string()).or_default().clone();
        let mut entry = entry;
        for (field, value) in fields {
            entry.insert(field.to_string(), value.clone());
        }
        self.store.lock().unwrap().hashes.insert(key.to_string(), entry);
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.store.lock().unwrap().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn setex(&self, key: &str, _ttl_secs: u64, value: String) -> Result<()> {
        self.store.lock().unwrap().strings.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.lock().unwrap().strings.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store.lock().unwrap().strings.contains_key(key))
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.store.lock().unwrap().strings.remove(key);
        Ok(())
    }

    async fn rpush(&self, key: &str, value: String) -> Result<()> {
        self.store
            .lock()
            .unwrap()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value);
        Ok(())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.lock().unwrap().lists.get_mut(key).and_then(|l| l.pop_front()))
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        self.store
            .lock()
            .unwrap()
            .published
            .push((channel.to_string(), payload.clone()));
        let _ = self.broadcast.send((channel.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>> {
        use futures::StreamExt;

        let channel = channel.to_string();
        let rx = self.broadcast.subscribe();
        let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(move |item| {
            let channel = channel.clone();
            async move {
                match item {
                    Ok((msg_channel, payload)) if msg_channel == channel => Some(payload),
                    _ => None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn pipelined_set_move_and_hset(
        &self,
        remove_set: Option<(&str, &str)>,
        add_set: Option<(&str, &str)>,
        hash_key: &str,
        fields: &[(&str, String)],
    ) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        if let Some((key, member)) = remove_set {
            if let Some(set) = store.sets.get_mut(key) {
                set.remove(member);
            }
        }
        if let Some((key, member)) = add_set {
            store.sets.entry(key.to_string()).or_default().insert(member.to_string());
        }
        let entry = store.hashes.entry(hash_key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.to_string(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sadd_and_smembers_round_trip() {
        let fake = FakeCoordinator::new();
        fake.sadd("s", "a").await.unwrap();
        fake.sadd("s", "b").await.unwrap();
        let mut members = fake.smembers("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn pipelined_move_is_atomic_from_the_readers_perspective() {
        let fake = FakeCoordinator::new();
        fake.sadd("active", "n1").await.unwrap();
        fake.pipelined_set_move_and_hset(
            Some(("active", "n1")),
            None,
            "status:n1",
            &[("status", "frozen".to_string())],
        )
        .await
        .unwrap();
        assert!(fake.smembers("active").await.unwrap().is_empty());
        assert_eq!(fake.hget("status:n1", "status").await.unwrap(), Some("frozen".to_string()));
    }
}
