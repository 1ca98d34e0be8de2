//! Connection cache keyed by instance address.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::client::{ConnectOptions, NodeClient, NodeConnector};
use crate::error::NodeResult;

/// Lazily populated map of instance address → live client.
///
/// Entries are created on first [`get`](ConnectionCache::get) and stay
/// cached until [`close`](ConnectionCache::close); the clients themselves
/// reconnect in the background, so a cached entry for a down instance is
/// still the right handle once the instance returns at the same address.
pub struct ConnectionCache {
    connector: Arc<dyn NodeConnector>,
    opts: ConnectOptions,
    entries: HashMap<String, Arc<dyn NodeClient>>,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn NodeConnector>, opts: ConnectOptions) -> Self {
        Self {
            connector,
            opts,
            entries: HashMap::new(),
        }
    }

    /// The cached client for `address`, connecting one if absent.
    ///
    /// An empty address is an explicit no-op and yields `Ok(None)`;
    /// fresh order rows carry empty addresses until provisioning fills
    /// them in.
    pub async fn get(&mut self, address: &str) -> NodeResult<Option<Arc<dyn NodeClient>>> {
        if address.is_empty() {
            return Ok(None);
        }
        if let Some(client) = self.entries.get(address) {
            return Ok(Some(client.clone()));
        }
        let client = self.connector.connect(address, &self.opts).await?;
        self.entries.insert(address.to_string(), client.clone());
        debug!(%address, cached = self.entries.len(), "connection opened");
        Ok(Some(client))
    }

    /// Tear down and evict the client for `address`, if any.
    pub async fn close(&mut self, address: &str) {
        if let Some(client) = self.entries.remove(address) {
            client.close().await;
            debug!(%address, "connection closed");
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tandem_core::{NodeMetrics, ReplicationStatus};

    struct StubClient {
        closed: AtomicUsize,
    }

    #[async_trait]
    impl NodeClient for StubClient {
        async fn is_reachable(&self, _wait: Duration) -> bool {
            true
        }

        async fn ping(&self) -> bool {
            true
        }

        async fn metrics(&self) -> NodeResult<NodeMetrics> {
            Ok(NodeMetrics::default())
        }

        async fn replication_status(&self) -> NodeResult<ReplicationStatus> {
            Ok(ReplicationStatus::Working)
        }

        async fn set_replication_source(&self, _source: Option<&str>) -> NodeResult<()> {
            Ok(())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct StubConnector {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl NodeConnector for StubConnector {
        async fn connect(
            &self,
            _address: &str,
            _opts: &ConnectOptions,
        ) -> NodeResult<Arc<dyn NodeClient>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubClient {
                closed: AtomicUsize::new(0),
            }))
        }
    }

    fn cache_with_connector() -> (ConnectionCache, Arc<StubConnector>) {
        let connector = Arc::new(StubConnector::default());
        let cache = ConnectionCache::new(connector.clone(), ConnectOptions::default());
        (cache, connector)
    }

    #[tokio::test]
    async fn get_connects_once_per_address() {
        let (mut cache, connector) = cache_with_connector();

        let first = cache.get("10.0.0.2").await.unwrap();
        let second = cache.get("10.0.0.2").await.unwrap();
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        cache.get("10.0.0.3").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn empty_address_is_a_noop() {
        let (mut cache, connector) = cache_with_connector();

        let client = cache.get("").await.unwrap();
        assert!(client.is_none());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn close_evicts_and_tears_down() {
        let (mut cache, connector) = cache_with_connector();

        cache.get("10.0.0.2").await.unwrap();
        assert!(cache.contains("10.0.0.2"));

        cache.close("10.0.0.2").await;
        assert!(!cache.contains("10.0.0.2"));

        // Closing an unknown address does nothing.
        cache.close("10.0.0.9").await;

        // A later get dials a fresh connection.
        cache.get("10.0.0.2").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }
}
