//! tandem-state — embedded order table for Tandem.
//!
//! Backed by [redb](https://docs.rs/redb), stores the managed pairs
//! (`orders`) and the orchestration host registry (`hosts`).
//!
//! # Architecture
//!
//! Domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Orders use a numeric `u64` key so table iteration doubles as the
//! health monitor's deterministic processing order. Updates are partial
//! patches ([`OrderPatch`]) applied read-modify-write inside a single
//! write transaction.
//!
//! The `OrderStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::OrderStore;
pub use types::*;
