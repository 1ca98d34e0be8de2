//! Failover — replace dead members of a pair in place.
//!
//! Replacements come up at the member's existing address, so nothing
//! downstream of the order table has to learn a new endpoint and the
//! connection cache entry stays valid. The surviving member (if any) is
//! the replication source for every replacement; with both members dead
//! the first replacement boots standalone and the second sources from it.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use tandem_core::{Availability, TandemConfig};
use tandem_node::ConnectionCache;
use tandem_orch::{ContainerOrchestrator, RetryPolicy, RunRequest};
use tandem_state::{NodeRecord, Order, OrderPatch, OrderStore};

use crate::error::{HealerError, HealerResult};
use crate::replication::{self, find_reachable_source};

/// Everything a recovery needs besides the order itself.
pub struct RecoveryContext<'a> {
    pub store: &'a OrderStore,
    pub orchestrator: &'a dyn ContainerOrchestrator,
    pub image: &'a str,
    pub network: &'a str,
    pub retry: RetryPolicy,
    /// Poll interval while waiting for a replacement's connection.
    pub poll_interval: Duration,
    /// Attempt cap for that wait.
    pub max_poll_attempts: u32,
    pub probe_timeout: Duration,
}

impl<'a> RecoveryContext<'a> {
    pub fn new(
        store: &'a OrderStore,
        orchestrator: &'a dyn ContainerOrchestrator,
        config: &'a TandemConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            image: &config.instance.image,
            network: &config.network.name,
            retry: crate::provision::retry_policy(&config.retry),
            poll_interval: config.failover.poll_interval(),
            max_poll_attempts: config.failover.max_poll_attempts,
            probe_timeout: config.monitor.probe_timeout(),
        }
    }
}

/// Replace every down member of `order` and re-coordinate the pair.
///
/// Down members are processed in pair order. Each replacement is run at
/// the member's existing address through the retry policy, then given a
/// bounded wait to come up; a replacement that never answers is torn
/// down again and the recovery aborts with
/// [`HealerError::ReplacementUnreachable`]. Replacements that already
/// landed are persisted before any error propagates, so the row keeps
/// naming the containers that are actually running and the next pass
/// retries only what is still down. On full success the refreshed pair
/// is persisted in a single patch and re-coordinated.
pub async fn recover(
    ctx: &RecoveryContext<'_>,
    cache: &mut ConnectionCache,
    order: &Order,
) -> HealerResult<Order> {
    let mut members = order.members.clone();
    let mut source = find_reachable_source(cache, &members, ctx.probe_timeout).await?;
    let mut landed = 0u32;

    for idx in 0..members.len() {
        if members[idx].availability.is_up() {
            continue;
        }
        if members[idx].address.is_empty() {
            warn!(order_id = order.id, member = idx, "down member has no address, leaving it");
            continue;
        }

        match replace_member(ctx, cache, order, &members[idx], source.as_deref()).await {
            Ok(replaced) => {
                let address = replaced.address.clone();
                members[idx] = replaced;
                landed += 1;
                if source.is_none() {
                    source = Some(address);
                }
            }
            Err(err) => {
                // Replacements that landed stay on record; the next
                // pass retries the rest.
                if landed > 0
                    && let Err(e) = ctx.store.update(order.id, &OrderPatch::members(members))
                {
                    error!(order_id = order.id, error = %e, "failed to record partial recovery");
                }
                return Err(err);
            }
        }
    }

    let updated = ctx.store.update(order.id, &OrderPatch::members(members))?;
    replication::coordinate(cache, &updated, ctx.probe_timeout).await?;
    Ok(updated)
}

/// Run one replacement at `member`'s existing address and wait for it.
///
/// The dead container is cleared out first so the address frees up. A
/// replacement that exhausts the poll budget is torn down again before
/// the error returns, so it cannot squat the address.
async fn replace_member(
    ctx: &RecoveryContext<'_>,
    cache: &mut ConnectionCache,
    order: &Order,
    member: &NodeRecord,
    source: Option<&str>,
) -> HealerResult<NodeRecord> {
    let address = member.address.clone();

    let old_id = member.container_id.clone();
    if !old_id.is_empty() {
        if let Err(e) = ctx.orchestrator.kill(&old_id).await {
            debug!(container = %old_id, error = %e, "kill of dead container failed");
        }
        if let Err(e) = ctx.orchestrator.remove(&old_id).await {
            debug!(container = %old_id, error = %e, "remove of dead container failed");
        }
    }

    let replication_source = source.map(|ip| cache.options().control_addr(ip));
    let req = RunRequest {
        image: ctx.image.to_string(),
        network: ctx.network.to_string(),
        address: address.clone(),
        memsize: order.memsize,
        replication_source,
    };
    let started = ctx
        .retry
        .run("replacement run", || ctx.orchestrator.run(&req))
        .await?;
    info!(
        order_id = order.id,
        container = %started.id,
        %address,
        source = source.unwrap_or("none"),
        "replacement started"
    );

    // The cache entry for this address stays put; the client
    // reconnects to the replacement. Give it a bounded wait.
    let Some(client) = cache.get(&address).await? else {
        return Err(HealerError::ReplacementUnreachable {
            order_id: order.id,
            address,
        });
    };
    let mut reachable = false;
    for _ in 0..ctx.max_poll_attempts {
        if client.is_reachable(ctx.poll_interval).await {
            reachable = true;
            break;
        }
    }
    if !reachable {
        warn!(
            order_id = order.id,
            container = %started.id,
            %address,
            "replacement never came up, tearing it down"
        );
        if let Err(e) = ctx.orchestrator.kill(&started.id).await {
            debug!(container = %started.id, error = %e, "kill of wedged replacement failed");
        }
        if let Err(e) = ctx.orchestrator.remove(&started.id).await {
            debug!(container = %started.id, error = %e, "remove of wedged replacement failed");
        }
        return Err(HealerError::ReplacementUnreachable {
            order_id: order.id,
            address,
        });
    }

    // Same address, same host; the observations start over.
    let mut replaced = NodeRecord::fresh(&started.id, &started.address, &member.host_id);
    replaced.availability = Availability::Up;
    Ok(replaced)
}
