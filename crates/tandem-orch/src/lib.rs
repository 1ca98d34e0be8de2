//! tandem-orch — container runtime driver surface.
//!
//! The supervisor provisions, kills, and removes store containers through
//! the [`ContainerOrchestrator`] trait and reads the managed network's
//! address usage from it. Driver failures are split into transient and
//! permanent ([`OrchError`]); provisioning calls go through a bounded
//! [`RetryPolicy`] that retries only the transient kind.

pub mod driver;
pub mod error;
pub mod retry;

pub use driver::{ContainerOrchestrator, NetworkTopology, RunRequest, RunningContainer};
pub use error::{OrchError, OrchResult};
pub use retry::RetryPolicy;
