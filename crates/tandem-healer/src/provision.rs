//! Provisioning — bring up pairs and queue orders for teardown.
//!
//! `Provisioner` owns the add path: lease an address against the live
//! network view, start a container there through the retry policy, and
//! record the pair as an order. Deletion is deliberately indirect. The
//! entry point only marks the order in [`PendingDeletions`]; the health
//! monitor skips marked orders and reaps them at the end of each pass,
//! so container teardown never races a health check of the same pair.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tandem_core::{Availability, InstanceConfig, NetworkConfig, RetryConfig, TandemConfig};
use tandem_lease::{LeaseSnapshot, Subnet, allocate, parse_addr};
use tandem_orch::{ContainerOrchestrator, RetryPolicy, RunRequest, RunningContainer};
use tandem_state::{NewOrder, NodeRecord, Order, OrderId, OrderStore};

use crate::error::{HealerError, HealerResult};

/// Orders marked for deletion but not yet reaped.
///
/// Shared between the deletion entry point and the health monitor;
/// cloning hands out another handle to the same set.
#[derive(Clone, Default)]
pub struct PendingDeletions {
    inner: Arc<Mutex<HashSet<OrderId>>>,
}

impl PendingDeletions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` for deletion; `false` if it was already marked.
    pub async fn mark(&self, id: OrderId) -> bool {
        self.inner.lock().await.insert(id)
    }

    pub async fn contains(&self, id: OrderId) -> bool {
        self.inner.lock().await.contains(&id)
    }

    /// Drain every marked id, lowest first.
    pub async fn take(&self) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self.inner.lock().await.drain().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

pub(crate) fn retry_policy(cfg: &RetryConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: cfg.max_attempts,
        initial_backoff: cfg.initial_backoff(),
        multiplier: cfg.multiplier,
    }
}

/// Creates and deletes orders.
#[derive(Clone)]
pub struct Provisioner {
    store: OrderStore,
    orchestrator: Arc<dyn ContainerOrchestrator>,
    pending: PendingDeletions,
    network: NetworkConfig,
    instance: InstanceConfig,
    retry: RetryPolicy,
}

impl Provisioner {
    pub fn new(
        store: OrderStore,
        orchestrator: Arc<dyn ContainerOrchestrator>,
        config: &TandemConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            pending: PendingDeletions::new(),
            network: config.network.clone(),
            instance: config.instance.clone(),
            retry: retry_policy(&config.retry),
        }
    }

    /// Handle to the shared deletion queue, for wiring up the monitor.
    pub fn pending(&self) -> PendingDeletions {
        self.pending.clone()
    }

    /// Lease the lowest free address and start one store container there.
    ///
    /// The snapshot merges the runtime's network view, every member
    /// address in the order table, and `skip` (addresses leased earlier
    /// in the same operation that the runtime may not report yet).
    /// `source` is the bare IP of the member the new container should
    /// replicate from. Does not touch the order table; the caller owns
    /// the returned container.
    pub async fn add(
        &self,
        memsize: f64,
        source: Option<&str>,
        skip: &[String],
    ) -> HealerResult<RunningContainer> {
        let net = self.orchestrator.inspect_network(&self.network.name).await?;
        let subnet_raw = if net.subnet.is_empty() {
            &self.network.subnet
        } else {
            &net.subnet
        };
        let subnet: Subnet = subnet_raw.parse()?;
        let gateway_raw = if net.gateway.is_empty() {
            &self.network.gateway
        } else {
            &net.gateway
        };
        let gateway = parse_addr(gateway_raw)?;

        let mut snapshot = LeaseSnapshot::from_addrs(&net.in_use);
        for addr in self.store.member_addresses()? {
            snapshot.insert(&addr);
        }
        for addr in skip {
            snapshot.insert(addr);
        }

        let address = allocate(subnet, gateway, &snapshot)?.to_string();
        let replication_source = source.map(|ip| format!("{ip}:{}", self.network.control_port));
        let req = RunRequest {
            image: self.instance.image.clone(),
            network: self.network.name.clone(),
            address,
            memsize,
            replication_source,
        };
        let started = self
            .retry
            .run("instance run", || self.orchestrator.run(&req))
            .await?;
        info!(
            container = %started.id,
            address = %started.address,
            source = source.unwrap_or("none"),
            "instance started"
        );
        Ok(started)
    }

    /// Best-effort teardown of a container this provisioner started.
    async fn release_container(&self, id: &str) {
        if let Err(e) = self.orchestrator.kill(id).await {
            debug!(container = %id, error = %e, "kill on release failed");
        }
        if let Err(e) = self.orchestrator.remove(id).await {
            warn!(container = %id, error = %e, "remove on release failed");
        }
    }

    /// Start a replicated pair: the first member boots standalone, the
    /// second replicates from it. A pair comes up whole or not at all;
    /// if the second member cannot start, the first is released again.
    pub async fn provision_pair(&self, memsize: f64) -> HealerResult<[NodeRecord; 2]> {
        let first = self.add(memsize, None, &[]).await?;
        let second = match self
            .add(memsize, Some(&first.address), std::slice::from_ref(&first.address))
            .await
        {
            Ok(second) => second,
            Err(err) => {
                self.release_container(&first.id).await;
                return Err(err);
            }
        };

        let mut members = [
            NodeRecord::fresh(&first.id, &first.address, &self.instance.host_id),
            NodeRecord::fresh(&second.id, &second.address, &self.instance.host_id),
        ];
        // The runtime confirmed both starts; health details follow on
        // the first monitor pass.
        for member in &mut members {
            member.availability = Availability::Up;
        }
        Ok(members)
    }

    /// Provision a pair and record it as a new order.
    pub async fn create_order(
        &self,
        owner: &str,
        pair_name: &str,
        memsize: Option<f64>,
    ) -> HealerResult<Order> {
        let memsize = memsize.unwrap_or(self.instance.memsize);
        let members = self.provision_pair(memsize).await?;
        let ids = [
            members[0].container_id.clone(),
            members[1].container_id.clone(),
        ];
        let order = match self.store.create(NewOrder {
            owner: owner.to_string(),
            pair_name: pair_name.to_string(),
            memsize,
            members,
        }) {
            Ok(order) => order,
            // An unrecorded pair would never be reaped.
            Err(err) => {
                for id in &ids {
                    self.release_container(id).await;
                }
                return Err(err.into());
            }
        };
        info!(
            order_id = order.id,
            owner = %order.owner,
            pair = %order.pair_name,
            memsize = order.memsize,
            "order created"
        );
        Ok(order)
    }

    /// Mark an order for deletion and return immediately.
    ///
    /// The row and the containers survive until the monitor reaps them.
    pub async fn delete_order(&self, order_id: OrderId) -> HealerResult<()> {
        if self.store.get(order_id)?.is_none() {
            return Err(HealerError::OrderNotFound(order_id));
        }
        if self.pending.mark(order_id).await {
            info!(order_id, "order marked for deletion");
        } else {
            debug!(order_id, "order already marked for deletion");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tandem_lease::LeaseError;
    use tandem_sim::SimCluster;

    fn fixture(subnet: &str, gateway: &str) -> (SimCluster, OrderStore, Provisioner) {
        let sim = SimCluster::new(subnet, gateway);
        let store = OrderStore::open_in_memory().unwrap();
        let mut config = TandemConfig::default();
        config.network.subnet = subnet.to_string();
        config.network.gateway = gateway.to_string();
        config.retry.initial_backoff = "1ms".to_string();
        let provisioner = Provisioner::new(store.clone(), Arc::new(sim.clone()), &config);
        (sim, store, provisioner)
    }

    #[tokio::test]
    async fn pairs_take_the_lowest_free_addresses() {
        let (sim, _store, provisioner) = fixture("172.20.0.0/16", "172.20.0.1");

        let first = provisioner.create_order("bob", "bob-cache", None).await.unwrap();
        assert_eq!(first.members[0].address, "172.20.0.2");
        assert_eq!(first.members[1].address, "172.20.0.3");

        let second = provisioner.create_order("alice", "alice-cache", None).await.unwrap();
        assert_eq!(second.members[0].address, "172.20.0.4");
        assert_eq!(second.members[1].address, "172.20.0.5");
        assert_eq!(sim.container_ids().await.len(), 4);
    }

    #[tokio::test]
    async fn pair_members_come_up_linked() {
        let (sim, _store, provisioner) = fixture("172.20.0.0/16", "172.20.0.1");

        let order = provisioner.create_order("bob", "bob-cache", None).await.unwrap();
        let [a, b] = &order.members;
        assert_ne!(a.address, b.address);
        assert!(a.availability.is_up() && b.availability.is_up());
        assert_eq!(sim.peer_of(&a.address).await.as_deref(), Some(b.address.as_str()));
        assert_eq!(sim.peer_of(&b.address).await.as_deref(), Some(a.address.as_str()));
    }

    #[tokio::test]
    async fn custom_memsize_overrides_the_default() {
        let (_sim, _store, provisioner) = fixture("172.20.0.0/16", "172.20.0.1");

        let order = provisioner
            .create_order("alice", "alice-cache", Some(1.2))
            .await
            .unwrap();
        assert_eq!(order.memsize, 1.2);

        let defaulted = provisioner.create_order("bob", "bob-cache", None).await.unwrap();
        assert_eq!(defaulted.memsize, 0.5);
    }

    #[tokio::test]
    async fn exhausted_subnet_refuses_the_pair() {
        // A /30 leaves one usable host after the gateway.
        let (sim, _store, provisioner) = fixture("172.20.0.0/30", "172.20.0.1");

        let err = provisioner.create_order("bob", "bob-cache", None).await.unwrap_err();
        assert!(matches!(err, HealerError::Lease(LeaseError::Exhausted { .. })));
        // The half-started first member was released with the failure.
        assert!(sim.container_ids().await.is_empty());
        // Its address leases out again.
        let solo = provisioner.add(0.5, None, &[]).await.unwrap();
        assert_eq!(solo.address, "172.20.0.2");
    }

    #[tokio::test]
    async fn deleting_an_unknown_order_fails() {
        let (_sim, _store, provisioner) = fixture("172.20.0.0/16", "172.20.0.1");

        let err = provisioner.delete_order(42).await.unwrap_err();
        assert!(matches!(err, HealerError::OrderNotFound(42)));
    }

    #[tokio::test]
    async fn delete_marks_without_touching_the_row() {
        let (sim, store, provisioner) = fixture("172.20.0.0/16", "172.20.0.1");

        let order = provisioner.create_order("bob", "bob-cache", None).await.unwrap();
        provisioner.delete_order(order.id).await.unwrap();

        assert!(provisioner.pending().contains(order.id).await);
        assert!(store.get(order.id).unwrap().is_some());
        assert_eq!(sim.container_ids().await.len(), 2);

        // Marking twice is harmless.
        provisioner.delete_order(order.id).await.unwrap();
        assert_eq!(provisioner.pending().len().await, 1);
    }

    #[tokio::test]
    async fn pending_ids_drain_lowest_first() {
        let pending = PendingDeletions::new();
        pending.mark(9).await;
        pending.mark(3).await;
        pending.mark(7).await;

        assert_eq!(pending.take().await, vec![3, 7, 9]);
        assert!(pending.is_empty().await);
    }
}
