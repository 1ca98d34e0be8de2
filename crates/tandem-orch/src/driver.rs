//! Container runtime driver trait and its request/response types.

use async_trait::async_trait;

use crate::error::OrchResult;

/// What to run for one pair member.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Store image to run.
    pub image: String,
    /// Container network to attach to.
    pub network: String,
    /// Fixed IPv4 address to bind on that network.
    pub address: String,
    /// Memory budget in GiB.
    pub memsize: f64,
    /// `ip:port` replication upstream, or `None` for a standalone boot.
    pub replication_source: Option<String>,
}

/// A container the runtime reports as started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningContainer {
    pub id: String,
    pub address: String,
}

/// Address usage of the managed network as the runtime sees it.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    /// CIDR of the network, e.g. `172.20.0.0/16`.
    pub subnet: String,
    /// Gateway, as a bare IP or CIDR literal.
    pub gateway: String,
    /// Addresses currently attached (bare IPs or CIDR literals).
    pub in_use: Vec<String>,
}

/// The container runtime operations the supervisor needs.
///
/// `kill` and `remove` are safe to call for containers that are already
/// gone; drivers report that as success so teardown stays idempotent.
#[async_trait]
pub trait ContainerOrchestrator: Send + Sync {
    /// Start a store container at a fixed address.
    async fn run(&self, req: &RunRequest) -> OrchResult<RunningContainer>;

    /// Stop a running container.
    async fn kill(&self, container_id: &str) -> OrchResult<()>;

    /// Remove a stopped container and free its address.
    async fn remove(&self, container_id: &str) -> OrchResult<()>;

    /// Inspect which addresses are attached to a network.
    async fn inspect_network(&self, name: &str) -> OrchResult<NetworkTopology>;
}
