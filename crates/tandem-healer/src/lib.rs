//! tandem-healer — the self-healing supervisor for replicated pairs.
//!
//! Every managed pair is an order: two store containers on fixed leased
//! addresses, replicating from one to the other. This crate owns the
//! whole lifecycle around that record:
//!
//! - [`Provisioner`] leases addresses, starts pairs, and records orders;
//!   deletion only marks an order in the shared [`PendingDeletions`] set.
//! - [`HealthMonitor`] is the single control loop. Each pass probes both
//!   members of every ready order, persists what it saw, and triggers
//!   repair; marked orders are reaped at the end of the pass.
//! - [`failover`] replaces dead members in place at their existing
//!   addresses, chaining replication off whatever survived.
//! - [`replication`] wires a pair from its first reachable member and
//!   verifies the link, leaving retries to the next pass.
//!
//! The monitor exclusively owns the connection cache and is the sole
//! writer of order lifecycle states; everything else goes through the
//! order table.

pub mod error;
pub mod failover;
pub mod monitor;
pub mod provision;
pub mod replication;

pub use error::{HealerError, HealerResult};
pub use failover::{RecoveryContext, recover};
pub use monitor::HealthMonitor;
pub use provision::{PendingDeletions, Provisioner};
pub use replication::{CoordinationOutcome, coordinate};
