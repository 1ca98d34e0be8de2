//! Health monitor loop — the sole writer of order lifecycle state.
//!
//! One pass reads every order, probes both members of each ready pair,
//! persists the refreshed records, and hands broken pairs to failover or
//! replication coordination. Passes are strictly sequential: per order,
//! per member, in pair order. Deletion requests queue up in
//! [`PendingDeletions`] and are reaped at the end of the pass, so a
//! teardown never interleaves with a health check of the same pair.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use tandem_core::{Availability, TandemConfig};
use tandem_node::ConnectionCache;
use tandem_orch::ContainerOrchestrator;
use tandem_state::{Order, OrderPatch, OrderState, OrderStore};

use crate::error::HealerResult;
use crate::failover::{self, RecoveryContext};
use crate::provision::PendingDeletions;
use crate::replication;

pub struct HealthMonitor {
    store: OrderStore,
    cache: ConnectionCache,
    orchestrator: Arc<dyn ContainerOrchestrator>,
    pending: PendingDeletions,
    config: TandemConfig,
}

impl HealthMonitor {
    pub fn new(
        store: OrderStore,
        cache: ConnectionCache,
        orchestrator: Arc<dyn ContainerOrchestrator>,
        pending: PendingDeletions,
        config: TandemConfig,
    ) -> Self {
        Self {
            store,
            cache,
            orchestrator,
            pending,
            config,
        }
    }

    /// Return orders stranded in `Checking` to `Ready`.
    ///
    /// Only this process writes lifecycle states, so a `Checking` row at
    /// startup means a previous run died mid-pass. Call once before the
    /// loop starts; stranded rows would otherwise be skipped forever.
    pub fn reset_stale_orders(&self) -> HealerResult<u32> {
        let mut reset = 0;
        for order in self.store.select_all()? {
            if order.state == OrderState::Checking {
                warn!(order_id = order.id, "order was left mid-check, resetting to ready");
                self.store
                    .update(order.id, &OrderPatch::state(OrderState::Ready))?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// One full pass over all orders, then a reap of pending deletions.
    pub async fn pass(&mut self) -> HealerResult<()> {
        for order in self.store.select_all()? {
            if self.pending.contains(order.id).await {
                continue;
            }
            if order.state != OrderState::Ready {
                continue;
            }
            if let Err(e) = self.check_order(&order).await {
                error!(order_id = order.id, error = %e, "health check failed");
            }
            // Back to ready even after a failed check; the next pass
            // picks the order up again.
            if let Err(e) = self
                .store
                .update(order.id, &OrderPatch::state(OrderState::Ready))
            {
                error!(order_id = order.id, error = %e, "failed to return order to ready");
            }
        }
        self.reap().await
    }

    /// Probe both members, persist what was seen, then repair.
    async fn check_order(&mut self, order: &Order) -> HealerResult<()> {
        self.store
            .update(order.id, &OrderPatch::state(OrderState::Checking))?;

        let probe_timeout = self.config.monitor.probe_timeout();
        let mut members = order.members.clone();
        let mut any_down = false;

        for member in &mut members {
            if let Some(client) = self.cache.get(&member.address).await?
                && client.is_reachable(probe_timeout).await
                && client.ping().await
            {
                member.availability = Availability::Up;
                match client.metrics().await {
                    Ok(metrics) => member.metrics = metrics,
                    Err(e) => {
                        debug!(address = %member.address, error = %e, "metrics read failed")
                    }
                }
                match client.replication_status().await {
                    Ok(status) => member.replication = status,
                    Err(e) => {
                        debug!(address = %member.address, error = %e, "replication status read failed")
                    }
                }
            } else {
                if member.availability.is_up() {
                    warn!(order_id = order.id, address = %member.address, "member went down");
                }
                member.availability = Availability::Down;
                any_down = true;
            }
        }

        let mut current = self.store.update(order.id, &OrderPatch::members(members))?;

        if any_down {
            let debounce = self.config.monitor.failover_debounce();
            if !debounce.is_zero() {
                info!(
                    order_id = order.id,
                    debounce_ms = debounce.as_millis() as u64,
                    "member down, settling before failover"
                );
                tokio::time::sleep(debounce).await;
            }
            let ctx = RecoveryContext::new(&self.store, self.orchestrator.as_ref(), &self.config);
            current = failover::recover(&ctx, &mut self.cache, &current).await?;
        }

        if current.members.iter().any(|m| !m.replication.is_working()) {
            replication::coordinate(&mut self.cache, &current, probe_timeout).await?;
        }
        Ok(())
    }

    /// Tear down every order marked for deletion: drop the row, evict
    /// both cached connections, then kill and remove both containers.
    async fn reap(&mut self) -> HealerResult<()> {
        for id in self.pending.take().await {
            let Some(order) = self.store.get(id)? else {
                warn!(order_id = id, "order marked for deletion was already gone");
                continue;
            };
            self.store.delete(id)?;
            for member in &order.members {
                if !member.address.is_empty() {
                    self.cache.close(&member.address).await;
                }
                if member.container_id.is_empty() {
                    continue;
                }
                if let Err(e) = self.orchestrator.kill(&member.container_id).await {
                    debug!(container = %member.container_id, error = %e, "kill during reap failed");
                }
                if let Err(e) = self.orchestrator.remove(&member.container_id).await {
                    warn!(container = %member.container_id, error = %e, "remove during reap failed");
                }
            }
            info!(order_id = id, pair = %order.pair_name, "order reaped");
        }
        Ok(())
    }

    /// Run the monitor loop until shutdown is signalled.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.monitor.pass_interval();
        info!(interval_ms = interval.as_millis() as u64, "health monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.pass().await {
                        error!(error = %e, "monitor pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("health monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Number of live cache entries, for observability.
    pub fn cached_connections(&self) -> usize {
        self.cache.len()
    }
}
