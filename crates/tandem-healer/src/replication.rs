//! Replication coordination across a pair.
//!
//! One member acts as the source and the other is pointed at it. The
//! source is simply the first member that answers within the probe
//! timeout; with both members up that is the first member in pair order,
//! so repeated coordination converges instead of flapping.

use std::time::Duration;

use tracing::{error, warn};

use tandem_node::ConnectionCache;
use tandem_state::{NodeRecord, Order};

use crate::error::HealerResult;

/// What a coordination attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationOutcome {
    /// The pair was wired up from this source address.
    Coordinated { source: String },
    /// Neither member was reachable; nothing to do this pass.
    Skipped,
}

/// Address of the first member whose client answers within `probe_timeout`,
/// in pair order.
pub(crate) async fn find_reachable_source(
    cache: &mut ConnectionCache,
    members: &[NodeRecord],
    probe_timeout: Duration,
) -> HealerResult<Option<String>> {
    for member in members {
        if let Some(client) = cache.get(&member.address).await?
            && client.is_reachable(probe_timeout).await
        {
            return Ok(Some(member.address.clone()));
        }
    }
    Ok(None)
}

/// Wire the pair's replication from the first reachable member.
///
/// Each non-source member is told to source from it, then both ends are
/// read back. A status that is not `Working` after the rewire is logged
/// and left alone; the next monitor pass re-invokes coordination, so
/// there is no inline retry. Re-coordinating a converged pair is a no-op
/// observable-wise.
pub async fn coordinate(
    cache: &mut ConnectionCache,
    order: &Order,
    probe_timeout: Duration,
) -> HealerResult<CoordinationOutcome> {
    let Some(source) = find_reachable_source(cache, &order.members, probe_timeout).await? else {
        warn!(order_id = order.id, "no reachable member, skipping coordination");
        return Ok(CoordinationOutcome::Skipped);
    };
    let source_endpoint = cache.options().control_addr(&source);

    for member in &order.members {
        if member.address == source {
            continue;
        }
        let Some(client) = cache.get(&member.address).await? else {
            continue;
        };
        if let Err(e) = client.set_replication_source(Some(&source_endpoint)).await {
            error!(
                order_id = order.id,
                member = %member.address,
                source = %source_endpoint,
                error = %e,
                "failed to set replication source"
            );
        }
    }

    // Read back both ends; divergence is an error to report, not to fix
    // here.
    for member in &order.members {
        let Some(client) = cache.get(&member.address).await? else {
            continue;
        };
        match client.replication_status().await {
            Ok(status) if status.is_working() => {}
            Ok(status) => error!(
                order_id = order.id,
                member = %member.address,
                %status,
                "replication not working after coordination"
            ),
            Err(e) => error!(
                order_id = order.id,
                member = %member.address,
                error = %e,
                "replication status unavailable"
            ),
        }
    }

    Ok(CoordinationOutcome::Coordinated { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tandem_node::{ConnectOptions, NodeConnector};
    use tandem_orch::{ContainerOrchestrator, RunRequest};
    use tandem_sim::SimCluster;
    use tandem_state::{NodeRecord, OrderState};

    const PROBE: Duration = Duration::from_millis(10);

    fn order_of(a: &str, b: &str) -> Order {
        Order {
            id: 1,
            owner: "tester".to_string(),
            pair_name: "pair".to_string(),
            memsize: 0.5,
            members: [
                NodeRecord::fresh("sim-1", a, "local"),
                NodeRecord::fresh("sim-2", b, "local"),
            ],
            state: OrderState::Ready,
        }
    }

    async fn boot(sim: &SimCluster, address: &str) {
        sim.run(&RunRequest {
            image: "img".to_string(),
            network: "tandem".to_string(),
            address: address.to_string(),
            memsize: 0.5,
            replication_source: None,
        })
        .await
        .unwrap();
    }

    fn cache_for(sim: &SimCluster) -> ConnectionCache {
        let connector: Arc<dyn NodeConnector> = Arc::new(sim.clone());
        ConnectionCache::new(connector, ConnectOptions::default())
    }

    #[tokio::test]
    async fn coordinates_two_standalone_members() {
        let sim = SimCluster::new("172.20.0.0/16", "172.20.0.1");
        boot(&sim, "172.20.0.2").await;
        boot(&sim, "172.20.0.3").await;
        let mut cache = cache_for(&sim);

        let order = order_of("172.20.0.2", "172.20.0.3");
        let outcome = coordinate(&mut cache, &order, PROBE).await.unwrap();

        assert_eq!(
            outcome,
            CoordinationOutcome::Coordinated {
                source: "172.20.0.2".to_string()
            }
        );
        assert_eq!(sim.peer_of("172.20.0.2").await.as_deref(), Some("172.20.0.3"));
        assert_eq!(sim.peer_of("172.20.0.3").await.as_deref(), Some("172.20.0.2"));
    }

    #[tokio::test]
    async fn recoordinating_a_converged_pair_changes_nothing() {
        let sim = SimCluster::new("172.20.0.0/16", "172.20.0.1");
        boot(&sim, "172.20.0.2").await;
        boot(&sim, "172.20.0.3").await;
        let mut cache = cache_for(&sim);
        let order = order_of("172.20.0.2", "172.20.0.3");

        let first = coordinate(&mut cache, &order, PROBE).await.unwrap();
        let second = coordinate(&mut cache, &order, PROBE).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(sim.peer_of("172.20.0.2").await.as_deref(), Some("172.20.0.3"));
        assert_eq!(sim.peer_of("172.20.0.3").await.as_deref(), Some("172.20.0.2"));
    }

    #[tokio::test]
    async fn skips_when_neither_member_answers() {
        let sim = SimCluster::new("172.20.0.0/16", "172.20.0.1");
        boot(&sim, "172.20.0.2").await;
        boot(&sim, "172.20.0.3").await;
        sim.fail_node("172.20.0.2").await;
        sim.fail_node("172.20.0.3").await;
        let mut cache = cache_for(&sim);

        let order = order_of("172.20.0.2", "172.20.0.3");
        let outcome = coordinate(&mut cache, &order, PROBE).await.unwrap();
        assert_eq!(outcome, CoordinationOutcome::Skipped);
    }

    #[tokio::test]
    async fn survivor_becomes_the_source() {
        let sim = SimCluster::new("172.20.0.0/16", "172.20.0.1");
        boot(&sim, "172.20.0.2").await;
        boot(&sim, "172.20.0.3").await;
        sim.fail_node("172.20.0.2").await;
        let mut cache = cache_for(&sim);

        let order = order_of("172.20.0.2", "172.20.0.3");
        let outcome = coordinate(&mut cache, &order, PROBE).await.unwrap();

        // The dead first member is passed over in pair order.
        assert_eq!(
            outcome,
            CoordinationOutcome::Coordinated {
                source: "172.20.0.3".to_string()
            }
        );
    }
}
