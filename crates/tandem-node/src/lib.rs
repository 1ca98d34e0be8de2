//! tandem-node — typed control connections to store instances.
//!
//! The supervisor talks to every pair member over a small RPC surface
//! ([`NodeClient`]): liveness, memory metrics, replication status, and
//! replication rewiring. Clients are produced by a [`NodeConnector`] and
//! held in a [`ConnectionCache`] keyed by instance address, so repeated
//! health passes reuse live connections instead of redialing.
//!
//! Both traits are object-safe; the real driver and the in-process fake
//! cluster plug in behind the same cache.

pub mod cache;
pub mod client;
pub mod error;

pub use cache::ConnectionCache;
pub use client::{ConnectOptions, NodeClient, NodeConnector};
pub use error::{NodeError, NodeResult};
