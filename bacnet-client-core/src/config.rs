//! Typed configuration for the driver, loaded from YAML and layered with
//! environment-variable overrides, mirroring the surrounding gateway's
//! `GatewayConfig` pattern.

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DriverConfig {
    pub bind_addr: SocketAddr,
    pub apdu_timeout_ms: u64,
    pub apdu_retries: u32,
    pub bbmd_address: Option<String>,
    pub bbmd_port: Option<u16>,
    /// MS/TP interface name. Read and logged only — no MS/TP datalink is
    /// implemented (§1 Non-goals); its presence gates `ip_to_instance`'s
    /// IP-keyed lookups, which are meaningless once BBMD or MS/TP routing is
    /// in play.
    pub iface: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:47808".parse().unwrap(),
            apdu_timeout_ms: 3000,
            apdu_retries: 3,
            bbmd_address: None,
            bbmd_port: None,
            iface: None,
        }
    }
}

impl DriverConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, DriverError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| DriverError::Resource(format!("reading config: {e}")))?;
        let mut config: Self = serde_yaml::from_str(&contents)
            .map_err(|e| DriverError::Resource(format!("parsing config: {e}")))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DriverError> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| DriverError::Resource(format!("serializing config: {e}")))?;
        fs::write(path, yaml).map_err(|e| DriverError::Resource(format!("writing config: {e}")))
    }

    /// Applies `BACNET_BBMD_ADDRESS`, `BACNET_BBMD_PORT`, `BACNET_IFACE` on
    /// top of whatever was loaded from file, matching the precedence the
    /// gateway's own environment-driven overrides use elsewhere.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = env::var("BACNET_BBMD_ADDRESS") {
            self.bbmd_address = Some(addr);
        }
        if let Ok(port) = env::var("BACNET_BBMD_PORT") {
            if let Ok(port) = port.parse() {
                self.bbmd_port = Some(port);
            }
        }
        if let Ok(iface) = env::var("BACNET_IFACE") {
            self.iface = Some(iface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_standard_bacnet_ip_port() {
        let config = DriverConfig::default();
        assert_eq!(config.bind_addr.port(), 47808);
    }

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        env::set_var("BACNET_BBMD_ADDRESS", "10.0.0.1");
        env::set_var("BACNET_BBMD_PORT", "47808");
        env::set_var("BACNET_IFACE", "eth1");

        let mut config = DriverConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.bbmd_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(config.bbmd_port, Some(47808));
        assert_eq!(config.iface.as_deref(), Some("eth1"));

        env::remove_var("BACNET_BBMD_ADDRESS");
        env::remove_var("BACNET_BBMD_PORT");
        env::remove_var("BACNET_IFACE");
    }
}
