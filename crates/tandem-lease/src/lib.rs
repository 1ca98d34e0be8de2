//! IP lease allocation for Tandem container networks.
//!
//! Every store instance gets a fixed IPv4 address on the managed network.
//! This crate owns the subnet math and the allocation rule: hand out the
//! numerically smallest free address, excluding the network and broadcast
//! addresses, the gateway, and everything already in use.
//!
//! There is no persistent lease table. Callers build a [`LeaseSnapshot`]
//! from the container runtime's view of the network plus the addresses
//! recorded in the order table, and allocate against that.

pub mod allocator;
pub mod error;
pub mod subnet;

pub use allocator::{LeaseSnapshot, allocate};
pub use error::{LeaseError, LeaseResult};
pub use subnet::{Subnet, normalize_addr, parse_addr};
