//! The simulated cluster and its client.
//!
//! One `SimState` behind a mutex models both sides of the world: the
//! container runtime (what is attached to the network) and the store
//! processes (liveness, metrics, replication links). Lock hold time is a
//! few map operations; nothing async runs under the lock.
//!
//! Replication links are symmetric: configuring B to source from A
//! establishes the A↔B link, and both ends report `Working` while the
//! link holds and both nodes are up. A node whose peer died reports
//! `Error` until the pair is re-coordinated.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use tandem_core::{NodeMetrics, ReplicationStatus};
use tandem_node::{ConnectOptions, NodeClient, NodeConnector, NodeError, NodeResult};
use tandem_orch::{
    ContainerOrchestrator, NetworkTopology, OrchError, OrchResult, RunRequest, RunningContainer,
};

/// A container as the simulated runtime sees it.
struct SimContainer {
    address: String,
    running: bool,
}

/// A store process as the simulated network sees it.
struct SimNode {
    up: bool,
    /// Memory budget in GiB, from the run request.
    memsize: f64,
    /// Bare address of the replication peer, if linked.
    peer: Option<String>,
    /// Number of metrics polls served; drives the fake usage counters.
    polls: u64,
}

#[derive(Default)]
struct SimState {
    containers: HashMap<String, SimContainer>,
    nodes: HashMap<String, SimNode>,
    next_container: u64,
    /// Successful and failed `run` calls, for retry assertions.
    run_attempts: u64,
    /// Inject: the next N `run` calls fail transiently.
    fail_runs: u32,
    /// Inject: containers at these addresses boot but never serve.
    wedged: HashSet<String>,
}

impl SimState {
    /// Drop the symmetric link on `addr`, if any.
    fn unlink(&mut self, addr: &str) {
        let old_peer = self.nodes.get_mut(addr).and_then(|n| n.peer.take());
        if let Some(peer) = old_peer {
            if let Some(peer_node) = self.nodes.get_mut(&peer) {
                if peer_node.peer.as_deref() == Some(addr) {
                    peer_node.peer = None;
                }
            }
        }
    }

    /// Establish the symmetric link `a` ↔ `b`, replacing older links on
    /// either end.
    fn link(&mut self, a: &str, b: &str) {
        if a == b {
            return;
        }
        self.unlink(a);
        self.unlink(b);
        if let Some(node) = self.nodes.get_mut(a) {
            node.peer = Some(b.to_string());
        }
        if let Some(node) = self.nodes.get_mut(b) {
            node.peer = Some(a.to_string());
        }
    }

    fn replication_of(&self, addr: &str) -> ReplicationStatus {
        let Some(node) = self.nodes.get(addr) else {
            return ReplicationStatus::Other("unknown".to_string());
        };
        match &node.peer {
            None => ReplicationStatus::Other("standalone".to_string()),
            Some(peer) => match self.nodes.get(peer) {
                Some(p) if p.up && p.peer.as_deref() == Some(addr) => ReplicationStatus::Working,
                _ => ReplicationStatus::Error,
            },
        }
    }

    fn address_busy(&self, address: &str) -> bool {
        self.containers
            .values()
            .any(|c| c.running && c.address == address)
    }
}

fn gib_to_bytes(gib: f64) -> u64 {
    (gib * 1024.0 * 1024.0 * 1024.0) as u64
}

/// `ip:port` → `ip`; bare addresses pass through.
fn strip_port(source: &str) -> &str {
    source.split_once(':').map(|(ip, _)| ip).unwrap_or(source)
}

/// An in-process cluster implementing both supervisor driver traits.
///
/// Cloning is cheap and shares the state, so one instance can serve as
/// the orchestrator while a clone serves as the connector.
#[derive(Clone)]
pub struct SimCluster {
    subnet: String,
    gateway: String,
    state: Arc<Mutex<SimState>>,
}

impl SimCluster {
    pub fn new(subnet: &str, gateway: &str) -> Self {
        Self {
            subnet: subnet.to_string(),
            gateway: gateway.to_string(),
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    // ── Fault injection ────────────────────────────────────────────

    /// Crash the store process at `address`. The runtime sees the
    /// container exit; clients see the node go unreachable.
    pub async fn fail_node(&self, address: &str) {
        let mut state = self.state.lock().await;
        if let Some(node) = state.nodes.get_mut(address) {
            node.up = false;
        }
        for container in state.containers.values_mut() {
            if container.address == address {
                container.running = false;
            }
        }
        debug!(%address, "sim: node failed");
    }

    /// Undo [`fail_node`](Self::fail_node): the process is back at the
    /// same address with its state intact.
    pub async fn revive_node(&self, address: &str) {
        let mut state = self.state.lock().await;
        if let Some(node) = state.nodes.get_mut(address) {
            node.up = true;
        }
        for container in state.containers.values_mut() {
            if container.address == address {
                container.running = true;
            }
        }
        debug!(%address, "sim: node revived");
    }

    /// Containers started at `address` from now on boot but never serve.
    pub async fn wedge_address(&self, address: &str) {
        self.state.lock().await.wedged.insert(address.to_string());
    }

    /// Undo [`wedge_address`](Self::wedge_address) for future starts.
    pub async fn unwedge_address(&self, address: &str) {
        self.state.lock().await.wedged.remove(address);
    }

    /// The next `n` `run` calls fail with a transient error.
    pub async fn fail_next_runs(&self, n: u32) {
        self.state.lock().await.fail_runs = n;
    }

    // ── Observers ──────────────────────────────────────────────────

    pub async fn has_container(&self, id: &str) -> bool {
        self.state.lock().await.containers.contains_key(id)
    }

    pub async fn is_container_running(&self, id: &str) -> bool {
        self.state
            .lock()
            .await
            .containers
            .get(id)
            .is_some_and(|c| c.running)
    }

    pub async fn container_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().await.containers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn node_is_up(&self, address: &str) -> bool {
        self.state
            .lock()
            .await
            .nodes
            .get(address)
            .is_some_and(|n| n.up)
    }

    pub async fn peer_of(&self, address: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .nodes
            .get(address)
            .and_then(|n| n.peer.clone())
    }

    pub async fn run_attempts(&self) -> u64 {
        self.state.lock().await.run_attempts
    }
}

#[async_trait]
impl ContainerOrchestrator for SimCluster {
    async fn run(&self, req: &RunRequest) -> OrchResult<RunningContainer> {
        let mut state = self.state.lock().await;
        state.run_attempts += 1;

        if state.fail_runs > 0 {
            state.fail_runs -= 1;
            return Err(OrchError::Transient("injected runtime failure".to_string()));
        }
        if state.address_busy(&req.address) {
            return Err(OrchError::Permanent(format!(
                "address {} already attached",
                req.address
            )));
        }

        state.next_container += 1;
        let id = format!("sim-{}", state.next_container);
        state.containers.insert(
            id.clone(),
            SimContainer {
                address: req.address.clone(),
                running: true,
            },
        );

        let up = !state.wedged.contains(&req.address);
        state.nodes.insert(
            req.address.clone(),
            SimNode {
                up,
                memsize: req.memsize,
                peer: None,
                polls: 0,
            },
        );
        if let Some(source) = &req.replication_source {
            let source_ip = strip_port(source).to_string();
            state.link(&req.address, &source_ip);
        }

        debug!(container = %id, address = %req.address, up, "sim: container started");
        Ok(RunningContainer {
            id,
            address: req.address.clone(),
        })
    }

    async fn kill(&self, container_id: &str) -> OrchResult<()> {
        let mut state = self.state.lock().await;
        let address = match state.containers.get_mut(container_id) {
            Some(container) => {
                container.running = false;
                container.address.clone()
            }
            // Already gone; teardown stays idempotent.
            None => return Ok(()),
        };
        if let Some(node) = state.nodes.get_mut(&address) {
            node.up = false;
        }
        debug!(container = container_id, "sim: container killed");
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> OrchResult<()> {
        let mut state = self.state.lock().await;
        let Some(container) = state.containers.get(container_id) else {
            return Ok(());
        };
        if container.running {
            return Err(OrchError::Permanent(format!(
                "container {container_id} is still running"
            )));
        }
        let address = container.address.clone();
        state.containers.remove(container_id);
        // Free the node slot unless another running container took the
        // address over in the meantime.
        if !state.address_busy(&address) {
            state.unlink(&address);
            state.nodes.remove(&address);
        }
        debug!(container = container_id, "sim: container removed");
        Ok(())
    }

    async fn inspect_network(&self, _name: &str) -> OrchResult<NetworkTopology> {
        let state = self.state.lock().await;
        let in_use = state
            .containers
            .values()
            .filter(|c| c.running)
            .map(|c| c.address.clone())
            .collect();
        Ok(NetworkTopology {
            subnet: self.subnet.clone(),
            gateway: self.gateway.clone(),
            in_use,
        })
    }
}

#[async_trait]
impl NodeConnector for SimCluster {
    async fn connect(
        &self,
        address: &str,
        _opts: &ConnectOptions,
    ) -> NodeResult<Arc<dyn NodeClient>> {
        // Connecting never blocks on a dead peer; reachability is the
        // client's concern.
        Ok(Arc::new(SimClient {
            address: address.to_string(),
            state: self.state.clone(),
        }))
    }
}

/// Client handle to one simulated node.
struct SimClient {
    address: String,
    state: Arc<Mutex<SimState>>,
}

impl SimClient {
    async fn up(&self) -> bool {
        self.state
            .lock()
            .await
            .nodes
            .get(&self.address)
            .is_some_and(|n| n.up)
    }

    fn unreachable(&self) -> NodeError {
        NodeError::Unreachable {
            address: self.address.clone(),
        }
    }
}

#[async_trait]
impl NodeClient for SimClient {
    async fn is_reachable(&self, wait: Duration) -> bool {
        if self.up().await {
            return true;
        }
        // Model the blocking connect attempt: burn the wait, then look
        // once more in case the node came up meanwhile.
        tokio::time::sleep(wait).await;
        self.up().await
    }

    async fn ping(&self) -> bool {
        self.up().await
    }

    async fn metrics(&self) -> NodeResult<NodeMetrics> {
        let mut state = self.state.lock().await;
        let Some(node) = state.nodes.get_mut(&self.address) else {
            return Err(self.unreachable());
        };
        if !node.up {
            return Err(self.unreachable());
        }
        node.polls += 1;
        let quota_capacity = gib_to_bytes(node.memsize);
        let quota_used = node.polls.saturating_mul(4096).min(quota_capacity);
        Ok(NodeMetrics {
            quota_capacity,
            quota_used,
            arena_capacity: quota_capacity / 2,
            arena_used: quota_used / 2,
            stats: HashMap::from([("polls".to_string(), node.polls)]),
        })
    }

    async fn replication_status(&self) -> NodeResult<ReplicationStatus> {
        let state = self.state.lock().await;
        match state.nodes.get(&self.address) {
            Some(node) if node.up => Ok(state.replication_of(&self.address)),
            _ => Err(self.unreachable()),
        }
    }

    async fn set_replication_source(&self, source: Option<&str>) -> NodeResult<()> {
        let mut state = self.state.lock().await;
        match state.nodes.get(&self.address) {
            Some(node) if node.up => {}
            _ => return Err(self.unreachable()),
        }
        match source {
            Some(source) => {
                let source_ip = strip_port(source).to_string();
                state.link(&self.address, &source_ip);
                debug!(address = %self.address, source = %source_ip, "sim: replication linked");
            }
            None => {
                state.unlink(&self.address);
                debug!(address = %self.address, "sim: replication detached");
            }
        }
        Ok(())
    }

    async fn close(&self) {}
}
