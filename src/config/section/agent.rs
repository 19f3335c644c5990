//! `[agent]` section configuration.
//!
//! On-device agents connect to this WebSocket endpoint.
//!
//! # Example
//!
//! ```toml
//! [agent]
//! interface = "127.0.0.1"   # use 0.0.0.0 for devices on the LAN
//! port = 7390
//! ```

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub interface: IpAddr,
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 7390,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.port == 0 {
            diag.error(FieldPath::new("agent.port"), "must not be 0");
        }
    }
}
