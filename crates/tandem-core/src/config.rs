//! tandem.toml configuration parser.
//!
//! Every section and field has a default, so a missing or partial file is
//! fine. Durations are written as strings ("100ms", "1s", "2m") and parsed
//! leniently — an unparsable value falls back to the field's default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    pub network: NetworkConfig,
    pub instance: InstanceConfig,
    pub monitor: MonitorConfig,
    pub failover: FailoverConfig,
    pub retry: RetryConfig,
}

/// The managed container network and the store control port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Name of the container network all pairs live on.
    pub name: String,
    /// Subnet to lease addresses from when the driver reports none.
    pub subnet: String,
    /// Gateway address, as a bare IP or a CIDR literal.
    pub gateway: String,
    /// Control port every instance listens on; addresses map 1:1 to it.
    pub control_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "tandem".to_string(),
            subnet: "172.20.0.0/16".to_string(),
            gateway: "172.20.0.1".to_string(),
            control_port: 3301,
        }
    }
}

/// What to provision for each pair member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Container image for store instances.
    pub image: String,
    /// Default memory budget per instance, in GiB.
    pub memsize: f64,
    /// Host registry entry new members are bound to.
    pub host_id: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            image: "tandem/memstore:latest".to_string(),
            memsize: 0.5,
            host_id: "local".to_string(),
        }
    }
}

/// Health monitor loop timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sleep between passes.
    pub pass_interval: String,
    /// Bounded wait for a member to report reachable during a probe.
    pub probe_timeout: String,
    /// Reconnect interval for cached client connections.
    pub reconnect_interval: String,
    /// Debounce window between detecting a down member and failing over.
    pub failover_debounce: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pass_interval: "100ms".to_string(),
            probe_timeout: "1s".to_string(),
            reconnect_interval: "1s".to_string(),
            failover_debounce: "2s".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn pass_interval(&self) -> Duration {
        parse_duration(&self.pass_interval).unwrap_or(Duration::from_millis(100))
    }

    pub fn probe_timeout(&self) -> Duration {
        parse_duration(&self.probe_timeout).unwrap_or(Duration::from_secs(1))
    }

    pub fn reconnect_interval(&self) -> Duration {
        parse_duration(&self.reconnect_interval).unwrap_or(Duration::from_secs(1))
    }

    pub fn failover_debounce(&self) -> Duration {
        parse_duration(&self.failover_debounce).unwrap_or(Duration::from_secs(2))
    }
}

/// Bounded wait for a freshly provisioned replacement to come up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Poll interval while waiting for a replacement's connection.
    pub poll_interval: String,
    /// Give up after this many polls; the order stays degraded and the
    /// next pass retries.
    pub max_poll_attempts: u32,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            poll_interval: "100ms".to_string(),
            max_poll_attempts: 100,
        }
    }
}

impl FailoverConfig {
    pub fn poll_interval(&self) -> Duration {
        parse_duration(&self.poll_interval).unwrap_or(Duration::from_millis(100))
    }
}

/// Retry policy for container provisioning calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles per `multiplier`.
    pub initial_backoff: String,
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: "250ms".to_string(),
            multiplier: 2,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        parse_duration(&self.initial_backoff).unwrap_or(Duration::from_millis(250))
    }
}

impl TandemConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TandemConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse a duration string like "100ms", "5s", "1m".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = TandemConfig::default();
        assert_eq!(config.network.subnet, "172.20.0.0/16");
        assert_eq!(config.network.control_port, 3301);
        assert_eq!(config.instance.memsize, 0.5);
        assert_eq!(config.monitor.pass_interval(), Duration::from_millis(100));
        assert_eq!(config.monitor.probe_timeout(), Duration::from_secs(1));
        assert_eq!(config.monitor.failover_debounce(), Duration::from_secs(2));
        assert_eq!(config.failover.max_poll_attempts, 100);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn parse_partial_toml() {
        let toml_str = r#"
[network]
name = "cache-net"
subnet = "10.9.0.0/24"

[monitor]
failover_debounce = "0s"
"#;
        let config: TandemConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.network.name, "cache-net");
        assert_eq!(config.network.subnet, "10.9.0.0/24");
        // Untouched sections keep their defaults.
        assert_eq!(config.network.gateway, "172.20.0.1");
        assert_eq!(config.monitor.failover_debounce(), Duration::ZERO);
        assert_eq!(config.monitor.probe_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn parse_empty_toml() {
        let config: TandemConfig = toml::from_str("").unwrap();
        assert_eq!(config.network.name, "tandem");
    }

    #[test]
    fn round_trip_through_toml() {
        let config = TandemConfig::default();
        let rendered = config.to_toml_string().unwrap();
        let parsed: TandemConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.instance.image, config.instance.image);
        assert_eq!(parsed.retry.max_attempts, config.retry.max_attempts);
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("100ms"), Some(Duration::from_millis(100)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("junk"), None);
    }

    #[test]
    fn bad_duration_falls_back_to_default() {
        let mut config = TandemConfig::default();
        config.monitor.probe_timeout = "soon".to_string();
        assert_eq!(config.monitor.probe_timeout(), Duration::from_secs(1));
    }
}
