//! Static dispatch configuration.
//!
//! The configuration is read once at startup (JSON file or defaults), validated, and then shared
//! read-only by every core. Dispatch cores never re-check it: a malformed configuration is
//! rejected here, before any worker starts.
//!
//! # Example
//!
//! ```json
//! {
//!   "vswitchd_core": 0,
//!   "client_switching_core": 1,
//!   "port_queue_cores": [ { "port": 0, "queue": 0, "core": 2 } ],
//!   "num_clients": 2,
//!   "num_vhost": 1,
//!   "stats_interval_secs": 1,
//!   "patches": [ { "from": 1, "to": 16 } ]
//! }
//! ```

use crate::removal::MAX_CORES;
use crate::vport::{PhyPortId, PortClass, VportId, MAX_VPORTS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Identity of an execution core.
pub type CoreId = u32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{role} core {core} is out of range (max {})", MAX_CORES - 1)]
    CoreOutOfRange { role: &'static str, core: CoreId },
    #[error("physical port {0} is out of range")]
    PortOutOfRange(PhyPortId),
    #[error("physical port {0} is assigned to more than one core")]
    DuplicatePort(PhyPortId),
    #[error("{class} port count {count} exceeds capacity {capacity}")]
    TooManyPorts {
        class: PortClass,
        count: u32,
        capacity: u32,
    },
    #[error("at least 2 clients are required (client 0 is reserved), got {0}")]
    TooFewClients(u32),
    #[error("patch {from} -> {to} references a vport outside the vport space")]
    InvalidPatch { from: VportId, to: VportId },
}

/// Assignment of one physical port receive queue to a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortQueueCore {
    pub port: PhyPortId,
    #[serde(default)]
    pub queue: u16,
    pub core: CoreId,
}

/// Static forwarding rule used by the reference datapath: everything received on `from` is
/// sent to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub from: VportId,
    pub to: VportId,
}

/// Top-level dispatch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Core that owns the shared clock, statistics reporting and control requests.
    pub vswitchd_core: CoreId,
    /// Core that round-robins the client, kernel-bridge, raw-socket and guest vports.
    pub client_switching_core: CoreId,
    /// Physical port queues pinned to dedicated cores, serviced in this order.
    pub port_queue_cores: Vec<PortQueueCore>,
    /// Client vports, including the reserved client 0.
    pub num_clients: u32,
    pub num_kni: u32,
    pub num_veth: u32,
    pub num_vhost: u32,
    /// Seconds between two statistics reports. Zero disables reporting.
    pub stats_interval_secs: u64,
    pub patches: Vec<Patch>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            vswitchd_core: 0,
            client_switching_core: 1,
            port_queue_cores: Vec::new(),
            num_clients: 2,
            num_kni: 0,
            num_veth: 0,
            num_vhost: 0,
            stats_interval_secs: 1,
            patches: Vec::new(),
        }
    }
}

impl DispatchConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: DispatchConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Configured number of vports in `class`. Physical ports count the distinct pinned ports.
    pub fn class_count(&self, class: PortClass) -> u32 {
        match class {
            PortClass::Client => self.num_clients,
            PortClass::Physical => self.physical_ports().len() as u32,
            PortClass::KernelBridge => self.num_kni,
            PortClass::RawSocket => self.num_veth,
            PortClass::GuestTransport => self.num_vhost,
        }
    }

    /// Distinct pinned physical ports, in configuration order.
    pub fn physical_ports(&self) -> Vec<PhyPortId> {
        let mut seen = HashSet::new();
        self.port_queue_cores
            .iter()
            .filter(|pqc| seen.insert(pqc.port))
            .map(|pqc| pqc.port)
            .collect()
    }

    /// Every core that carries at least one role, ascending and deduplicated.
    pub fn active_cores(&self) -> Vec<CoreId> {
        let mut cores: Vec<CoreId> = self
            .port_queue_cores
            .iter()
            .map(|pqc| pqc.core)
            .chain([self.vswitchd_core, self.client_switching_core])
            .collect();
        cores.sort_unstable();
        cores.dedup();
        cores
    }

    /// Check every invariant the dispatch cores rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_core("vswitchd", self.vswitchd_core)?;
        check_core("client switching", self.client_switching_core)?;

        let mut ports = HashSet::new();
        for pqc in &self.port_queue_cores {
            check_core("port switching", pqc.core)?;
            if u32::from(pqc.port) >= PortClass::Physical.capacity() {
                return Err(ConfigError::PortOutOfRange(pqc.port));
            }
            if !ports.insert(pqc.port) {
                return Err(ConfigError::DuplicatePort(pqc.port));
            }
        }

        if self.num_clients < 2 {
            return Err(ConfigError::TooFewClients(self.num_clients));
        }
        for class in PortClass::ROUND_ROBIN {
            let count = self.class_count(class);
            if count > class.capacity() {
                return Err(ConfigError::TooManyPorts {
                    class,
                    count,
                    capacity: class.capacity(),
                });
            }
        }

        for patch in &self.patches {
            if patch.from >= MAX_VPORTS || patch.to >= MAX_VPORTS {
                return Err(ConfigError::InvalidPatch {
                    from: patch.from,
                    to: patch.to,
                });
            }
        }
        Ok(())
    }
}

fn check_core(role: &'static str, core: CoreId) -> Result<(), ConfigError> {
    if core as usize >= MAX_CORES {
        return Err(ConfigError::CoreOutOfRange { role, core });
    }
    Ok(())
}
