//! tandem-core — shared types and configuration for the Tandem supervisor.
//!
//! Holds the `tandem.toml` configuration model and the value types that
//! cross crate boundaries: per-instance memory metrics, replication link
//! status, and the up/down availability flag.

pub mod config;
pub mod types;

pub use config::{
    FailoverConfig, InstanceConfig, MonitorConfig, NetworkConfig, RetryConfig, TandemConfig,
};
pub use types::*;
