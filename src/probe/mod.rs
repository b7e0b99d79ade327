//! External capabilities the engine consumes.
//!
//! The core never shells out itself; everything it learns about live port
//! state arrives through [`PortProbe`], and everything it does to processes
//! and containers goes through [`ProcessControl`] / [`ContainerControl`].
//! Default system-backed implementations live in [`system`]; tests swap in
//! scriptable mocks.

pub mod system;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use system::{DockerContainerControl, SignalProcessControl, SystemProbe};

/// A process holding a port, as reported by the probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub command: Option<String>,
}

/// A container publishing a port, as reported by the probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
}

/// Everything found holding one port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortOccupants {
    pub processes: Vec<ProcessInfo>,
    pub containers: Vec<ContainerInfo>,
}

impl PortOccupants {
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty() && self.containers.is_empty()
    }

    /// One-line summary for conflict details and log lines.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "unknown occupant".to_string();
        }
        let mut parts: Vec<String> = self
            .processes
            .iter()
            .map(|p| format!("process '{}' (pid {})", p.name, p.pid))
            .collect();
        parts.extend(
            self.containers
                .iter()
                .map(|c| format!("container '{}'", c.name)),
        );
        parts.join(", ")
    }
}

/// Read-only view of live port state.
///
/// Implementations must be conservative: when occupancy cannot be determined,
/// return an error and let the caller assume the port is occupied.
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_occupied(&self, port: u16) -> Result<bool>;

    async fn occupants(&self, port: u16) -> Result<PortOccupants>;
}

/// Signal-level control over processes found holding a port.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn graceful_stop(&self, pid: u32) -> Result<()>;

    async fn force_stop(&self, pid: u32) -> Result<()>;

    async fn is_alive(&self, pid: u32) -> bool;
}

/// Control over containers found publishing a port.
#[async_trait]
pub trait ContainerControl: Send + Sync {
    async fn stop(&self, name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lists_processes_then_containers() {
        let occ = PortOccupants {
            processes: vec![ProcessInfo {
                pid: 4821,
                name: "node".into(),
                command: None,
            }],
            containers: vec![ContainerInfo {
                name: "warden-db".into(),
            }],
        };
        let text = occ.describe();
        assert!(text.contains("process 'node' (pid 4821)"));
        assert!(text.contains("container 'warden-db'"));
    }

    #[test]
    fn describe_empty_is_unknown() {
        assert_eq!(PortOccupants::default().describe(), "unknown occupant");
    }
}
