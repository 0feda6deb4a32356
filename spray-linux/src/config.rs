//! Load config from file and environment.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use spray_core::NodeAddr;

/// Daemon configuration. File: ~/.config/spraywait/config.toml or /etc/spraywait/config.toml.
/// Env overrides: SPRAYWAIT_PORT, SPRAYWAIT_ADDRESS, SPRAYWAIT_BROADCAST.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UDP port shared by every node on the segment (default 45680).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Where link frames are sent (default 255.255.255.255).
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: Ipv4Addr,
    /// Node address as 4 hex digits. Takes precedence over `node_name`.
    #[serde(default)]
    pub address: Option<String>,
    /// Stable name the node address is derived from when `address` is unset.
    #[serde(default)]
    pub node_name: Option<String>,
    /// Reliable-link retransmission interval (default 500 ms).
    #[serde(default = "default_retransmit_ms")]
    pub retransmit_ms: u64,
    #[serde(default)]
    pub queue_delay_ms: Option<u64>,
    #[serde(default)]
    pub packet_delay_ms: Option<u64>,
    #[serde(default)]
    pub unconfirmed_ms: Option<u64>,
    #[serde(default)]
    pub max_lifetime_ms: Option<u64>,
}

fn default_port() -> u16 {
    45680
}
fn default_broadcast_addr() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}
fn default_retransmit_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            broadcast_addr: default_broadcast_addr(),
            address: None,
            node_name: None,
            retransmit_ms: default_retransmit_ms(),
            queue_delay_ms: None,
            packet_delay_ms: None,
            unconfirmed_ms: None,
            max_lifetime_ms: None,
        }
    }
}

impl Config {
    /// Node address: explicit `address`, else derived from `node_name`, else random.
    pub fn node_address(&self) -> Result<NodeAddr, spray_core::AddrParseError> {
        if let Some(a) = &self.address {
            return a.parse();
        }
        Ok(match &self.node_name {
            Some(name) => NodeAddr::from_name(name),
            None => NodeAddr::random(),
        })
    }

    /// Engine config with any timing overrides applied. Every delay is at least 1 ms.
    pub fn engine(&self) -> spray_core::Config {
        let mut c = spray_core::Config::default();
        if let Some(ms) = self.queue_delay_ms {
            c.queue_delay = millis(ms);
        }
        if let Some(ms) = self.packet_delay_ms {
            c.packet_delay = millis(ms);
        }
        if let Some(ms) = self.unconfirmed_ms {
            c.timeout_unconfirmed = millis(ms);
        }
        if let Some(ms) = self.max_lifetime_ms {
            c.max_lifetime = millis(ms);
        }
        c
    }

    pub fn retransmit_interval(&self) -> Duration {
        millis(self.retransmit_ms)
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let c = load_file().unwrap_or_default();
    apply_env(c, |k| std::env::var(k).ok())
}

fn apply_env(mut c: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(s) = var("SPRAYWAIT_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.port = p;
        }
    }
    if let Some(s) = var("SPRAYWAIT_ADDRESS") {
        c.address = Some(s);
    }
    if let Some(s) = var("SPRAYWAIT_BROADCAST") {
        if let Ok(a) = s.parse::<Ipv4Addr>() {
            c.broadcast_addr = a;
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/spraywait/config.toml"));
    }
    out.push(PathBuf::from("/etc/spraywait/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match toml::from_str::<Config>(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => tracing::warn!(path = %p.display(), error = %e, "ignoring config file"),
                },
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "cannot read config file"),
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.port, 45680);
        assert_eq!(c.broadcast_addr, Ipv4Addr::BROADCAST);
        assert_eq!(c.engine(), spray_core::Config::default());
    }

    #[test]
    fn file_fields_and_overrides() {
        let c: Config = toml::from_str(
            r#"
            port = 5000
            address = "00ff"
            queue_delay_ms = 250
            max_lifetime_ms = 10000
            "#,
        )
        .unwrap();
        assert_eq!(c.port, 5000);
        assert_eq!(c.node_address().unwrap(), NodeAddr::from_bytes([0x00, 0xff]));
        let e = c.engine();
        assert_eq!(e.queue_delay, Duration::from_millis(250));
        assert_eq!(e.max_lifetime, Duration::from_secs(10));
        assert_eq!(e.packet_delay, spray_core::Config::default().packet_delay);
    }

    #[test]
    fn zero_delays_are_clamped() {
        let c: Config = toml::from_str(
            r#"
            retransmit_ms = 0
            queue_delay_ms = 0
            packet_delay_ms = 0
            unconfirmed_ms = 0
            max_lifetime_ms = 0
            "#,
        )
        .unwrap();
        let e = c.engine();
        let min = Duration::from_millis(1);
        assert_eq!(e.queue_delay, min);
        assert_eq!(e.packet_delay, min);
        assert_eq!(e.timeout_unconfirmed, min);
        assert_eq!(e.max_lifetime, min);
        assert_eq!(c.retransmit_interval(), min);
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(toml::from_str::<Config>("colour = 1").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let c = apply_env(Config::default(), |k| match k {
            "SPRAYWAIT_PORT" => Some("7000".into()),
            "SPRAYWAIT_ADDRESS" => Some("beef".into()),
            "SPRAYWAIT_BROADCAST" => Some("not-an-ip".into()),
            _ => None,
        });
        assert_eq!(c.port, 7000);
        assert_eq!(c.node_address().unwrap(), NodeAddr::from_bytes([0xbe, 0xef]));
        assert_eq!(c.broadcast_addr, Ipv4Addr::BROADCAST);
    }

    #[test]
    fn name_derived_address() {
        let c = Config {
            node_name: Some("sensor-3".into()),
            ..Config::default()
        };
        assert_eq!(c.node_address().unwrap(), NodeAddr::from_name("sensor-3"));
    }
}
