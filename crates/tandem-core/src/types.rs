//! Value types shared across the Tandem crates.
//!
//! These are the observations a health probe pulls from a store instance.
//! The persisted `Order`/`NodeRecord` rows embed them; the node client
//! traits return them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Memory-pool metrics reported by a single store instance.
///
/// Capacities and usage are bytes. `quota` is the hard budget the instance
/// was provisioned with; `arena` is the slab arena actually mapped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeMetrics {
    pub quota_capacity: u64,
    pub quota_used: u64,
    pub arena_capacity: u64,
    pub arena_used: u64,
    /// Operational counters (command counts, item counts, ...).
    pub stats: HashMap<String, u64>,
}

/// State of an instance's replication link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStatus {
    /// The link is established and the peer is being followed.
    Working,
    /// The link is broken or the peer is unreachable.
    Error,
    /// Any other raw status string the instance reported.
    Other(String),
}

impl ReplicationStatus {
    /// Whether the link is in the expected healthy state.
    pub fn is_working(&self) -> bool {
        matches!(self, ReplicationStatus::Working)
    }

    /// Normalize a raw status string from the wire.
    ///
    /// Store implementations disagree on vocabulary ("working" vs
    /// "follow"); anything unrecognized is preserved verbatim.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "working" | "follow" => ReplicationStatus::Working,
            "error" | "stopped" | "disconnected" => ReplicationStatus::Error,
            other => ReplicationStatus::Other(other.to_string()),
        }
    }
}

impl Default for ReplicationStatus {
    fn default() -> Self {
        ReplicationStatus::Other("unknown".to_string())
    }
}

impl fmt::Display for ReplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationStatus::Working => f.write_str("working"),
            ReplicationStatus::Error => f.write_str("error"),
            ReplicationStatus::Other(raw) => f.write_str(raw),
        }
    }
}

/// Availability flag for one member of a pair, as last observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Up,
    /// Fresh records start here until the first health pass observes them.
    #[default]
    Down,
}

impl Availability {
    pub fn is_up(self) -> bool {
        self == Availability::Up
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Up => f.write_str("up"),
            Availability::Down => f.write_str("down"),
        }
    }
}
