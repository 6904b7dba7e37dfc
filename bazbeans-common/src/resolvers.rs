use crate::coordinator::CoordinatorClient;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

/// Any strategy for turning a `NodeId` into a routable IP literal. Returns
/// `None` rather than erroring when a node simply isn't resolvable by this
/// strategy — that is the normal "try the next one" case, not a failure.
#[async_trait]
pub trait IpResolver: Send + Sync {
    async fn resolve(&self, node_id: &str) -> Option<String>;
}

/// Resolves via the coordinator's `node_ips` hash, where nodes self-register
/// their outward-facing address.
pub struct RegistryResolver<C: CoordinatorClient> {
    client: Arc<C>,
    node_ips_key: String,
}

impl<C: CoordinatorClient> RegistryResolver<C> {
    pub fn new(client: Arc<C>, node_ips_key: String) -> Self {
        Self { client, node_ips_key }
    }
}

#[async_trait]
impl<C: CoordinatorClient> IpResolver for RegistryResolver<C> {
    async fn resolve(&self, node_id: &str) -> Option<String> {
        self.client.hget(&self.node_ips_key, node_id).await.ok().flatten()
    }
}

/// Resolves by concatenating `node_id + domain_suffix` and performing a DNS
/// lookup.
pub struct DnsResolver {
    domain_suffix: String,
}

impl DnsResolver {
    pub fn new(domain_suffix: impl Into<String>) -> Self {
        Self { domain_suffix: domain_suffix.into() }
    }
}

#[async_trait]
impl IpResolver for DnsResolver {
    async fn resolve(&self, node_id: &str) -> Option<String> {
        let hostname = format!("{node_id}{}", self.domain_suffix);
        tokio::task::spawn_blocking(move || {
            (hostname.as_str(), 0u16)
                .to_socket_addrs()
                .ok()
                .and_then(|mut addrs| addrs.next())
                .map(|addr: SocketAddr| addr.ip().to_string())
        })
        .await
        .ok()
        .flatten()
    }
}

/// In-memory static mapping, for fixed topologies or tests.
pub struct StaticResolver {
    mapping: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }
}

#[async_trait]
impl IpResolver for StaticResolver {
    async fn resolve(&self, node_id: &str) -> Option<String> {
        self.mapping.get(node_id).cloned()
    }
}

/// Delegates to a user-supplied async function, for host-process-specific
/// resolution logic the core fabric has no business knowing about.
pub struct CallbackResolver<F> {
    callback: F,
}

impl<F> CallbackResolver<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> IpResolver for CallbackResolver<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    async fn resolve(&self, node_id: &str) -> Option<String> {
        (self.callback)(node_id)
    }
}

/// Ignores `node_id` entirely and returns the local outbound IP, discovered
/// via the same UDP-connect trick the agent uses for self-registration.
/// Useful for single-node setups or local testing.
pub struct AutoDetectResolver;

impl AutoDetectResolver {
    pub fn detect_local_ip() -> Option<String> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        socket.local_addr().ok().map(|addr| addr.ip().to_string())
    }
}

#[async_trait]
impl IpResolver for AutoDetectResolver {
    async fn resolve(&self, _node_id: &str) -> Option<String> {
        Some(Self::detect_local_ip().unwrap_or_else(|| "127.0.0.1".to_string()))
    }
}

/// Tries a primary resolver, then a single fallback.
pub struct ChainedResolver {
    primary: Box<dyn IpResolver>,
    fallback: Box<dyn IpResolver>,
}

impl ChainedResolver {
    pub fn new(primary: Box<dyn IpResolver>, fallback: Box<dyn IpResolver>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl IpResolver for ChainedResolver {
    async fn resolve(&self, node_id: &str) -> Option<String> {
        match self.primary.resolve(node_id).await {
            Some(ip) => Some(ip),
            None => self.fallback.resolve(node_id).await,
        }
    }
}

/// Tries an ordered list of resolvers; the first non-empty result wins.
pub struct MultiFallbackResolver {
    resolvers: Vec<Box<dyn IpResolver>>,
}

impl MultiFallbackResolver {
    pub fn new(resolvers: Vec<Box<dyn IpResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl IpResolver for MultiFallbackResolver {
    async fn resolve(&self, node_id: &str) -> Option<String> {
        for resolver in &self.resolvers {
            if let Some(ip) = resolver.resolve(node_id).await {
                return Some(ip);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCoordinator;

    #[tokio::test]
    async fn registry_resolver_reads_node_ips_hash() {
        let client = Arc::new(FakeCoordinator::new());
        client.hset_many("bazbeans:node_ips", &[("n1", "10.0.0.1".to_string())]).await.unwrap();
        let resolver = RegistryResolver::new(client, "bazbeans:node_ips".to_string());
        assert_eq!(resolver.resolve("n1").await, Some("10.0.0.1".to_string()));
        assert_eq!(resolver.resolve("missing").await, None);
    }

    #[tokio::test]
    async fn static_resolver_returns_mapped_ip() {
        let mut map = HashMap::new();
        map.insert("n1".to_string(), "192.168.1.1".to_string());
        let resolver = StaticResolver::new(map);
        assert_eq!(resolver.resolve("n1").await, Some("192.168.1.1".to_string()));
        assert_eq!(resolver.resolve("n2").await, None);
    }

    #[tokio::test]
    async fn chained_resolver_falls_through_to_fallback() {
        let mut empty = HashMap::new();
        empty.insert("other".to_string(), "1.1.1.1".to_string());
        let mut fallback_map = HashMap::new();
        fallback_map.insert("n1".to_string(), "10.0.0.9".to_string());
        let chained = ChainedResolver::new(
            Box::new(StaticResolver::new(empty)),
            Box::new(StaticResolver::new(fallback_map)),
        );
        assert_eq!(chained.resolve("n1").await, Some("10.0.0.9".to_string()));
    }

    #[tokio::test]
    async fn multi_fallback_resolver_returns_first_hit() {
        let mut second = HashMap::new();
        second.insert("n1".to_string(), "10.0.0.2".to_string());
        let resolvers: Vec<Box<dyn IpResolver>> = vec![
            Box::new(StaticResolver::new(HashMap::new())),
            Box::new(StaticResolver::new(second)),
        ];
        let multi = MultiFallbackResolver::new(resolvers);
        assert_eq!(multi.resolve("n1").await, Some("10.0.0.2".to_string()));
    }

    #[tokio::test]
    async fn callback_resolver_delegates_to_closure() {
        let resolver = CallbackResolver::new(|node_id: &str| {
            if node_id == "n1" { Some("203.0.113.1".to_string()) } else { None }
        });
        assert_eq!(resolver.resolve("n1").await, Some("203.0.113.1".to_string()));
    }
}
