//! Typed client surface for store instances.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tandem_core::{NodeMetrics, ReplicationStatus};

use crate::error::NodeResult;

/// Connection parameters shared by every cached client.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Control port every instance listens on; bare addresses map 1:1
    /// onto it.
    pub control_port: u16,
    /// How often a disconnected client retries in the background.
    pub reconnect_interval: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            control_port: 3301,
            reconnect_interval: Duration::from_secs(1),
        }
    }
}

impl ConnectOptions {
    /// The `ip:port` control endpoint for an instance address.
    pub fn control_addr(&self, address: &str) -> String {
        format!("{address}:{}", self.control_port)
    }
}

/// Control connection to one store instance.
///
/// Connecting never blocks on a dead peer: implementations keep retrying
/// in the background at the configured reconnect interval, and callers
/// gate RPCs on [`is_reachable`](NodeClient::is_reachable) with a bounded
/// wait instead of handling connect errors inline.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Wait up to `wait` for the connection to become usable.
    async fn is_reachable(&self, wait: Duration) -> bool;

    /// Application-level liveness check over an established connection.
    async fn ping(&self) -> bool;

    /// Memory quota/arena usage plus operational counters.
    async fn metrics(&self) -> NodeResult<NodeMetrics>;

    /// Health of the replication link as this instance reports it.
    async fn replication_status(&self) -> NodeResult<ReplicationStatus>;

    /// Point replication at `source` (an `ip:port` endpoint), or detach
    /// when `None`. Reconfiguring to the current source is a no-op.
    async fn set_replication_source(&self, source: Option<&str>) -> NodeResult<()>;

    /// Tear down the connection. Idempotent.
    async fn close(&self);
}

/// Factory for [`NodeClient`]s; the connection cache owns one.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    /// Open a client for a bare instance address.
    async fn connect(
        &self,
        address: &str,
        opts: &ConnectOptions,
    ) -> NodeResult<Arc<dyn NodeClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_addr_appends_port() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.control_addr("172.20.0.2"), "172.20.0.2:3301");

        let opts = ConnectOptions {
            control_port: 4000,
            ..ConnectOptions::default()
        };
        assert_eq!(opts.control_addr("10.0.0.5"), "10.0.0.5:4000");
    }
}
