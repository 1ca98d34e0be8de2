//! tandem-sim — an in-process fake cluster.
//!
//! [`SimCluster`] implements both driver traits of the supervisor over a
//! single shared state: `ContainerOrchestrator` for the container side
//! and `NodeConnector` for the store-client side. Containers "run"
//! instantly, nodes serve a simulated replication link, and a small
//! fault-injection surface (`fail_node`, `wedge_address`,
//! `fail_next_runs`) drives the recovery paths in tests and in
//! `tandemd sim`.

pub mod cluster;

pub use cluster::SimCluster;
