//! Shared test support: a scriptable in-memory world implementing the
//! probe and control capabilities, so resolution flows run end-to-end
//! without touching real processes, containers, or sockets.

// Each integration test binary uses a different slice of this module.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use port_warden::error::{Error, Result};
use port_warden::probe::{
    ContainerControl, ContainerInfo, PortOccupants, PortProbe, ProcessControl, ProcessInfo,
};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct WorldState {
    ports: HashMap<u16, PortOccupants>,
    pid_ports: HashMap<u32, u16>,
    container_ports: HashMap<String, u16>,
    alive: HashSet<u32>,
    /// PIDs that ignore a graceful stop and only die when forced.
    stubborn: HashSet<u32>,
    graceful_sent: Vec<u32>,
    force_sent: Vec<u32>,
    container_stops: Vec<String>,
    probe_calls: u32,
    probe_down: bool,
}

/// One shared world; pass the same `Arc<MockWorld>` to the builder as
/// probe, process control, and container control.
#[derive(Default)]
pub struct MockWorld {
    state: Mutex<WorldState>,
}

impl MockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occupy_with_process(&self, port: u16, name: &str, pid: u32) {
        let mut state = self.state.lock();
        state.ports.entry(port).or_default().processes.push(ProcessInfo {
            pid,
            name: name.to_string(),
            command: Some(name.to_string()),
        });
        state.pid_ports.insert(pid, port);
        state.alive.insert(pid);
    }

    pub fn occupy_with_container(&self, port: u16, name: &str) {
        let mut state = self.state.lock();
        state.ports.entry(port).or_default().containers.push(ContainerInfo {
            name: name.to_string(),
        });
        state.container_ports.insert(name.to_string(), port);
    }

    /// Occupied with no identifiable owner.
    pub fn occupy_unknown(&self, port: u16) {
        self.state.lock().ports.entry(port).or_default();
    }

    pub fn release(&self, port: u16) {
        self.state.lock().ports.remove(&port);
    }

    pub fn set_stubborn(&self, pid: u32) {
        self.state.lock().stubborn.insert(pid);
    }

    pub fn set_probe_down(&self, down: bool) {
        self.state.lock().probe_down = down;
    }

    pub fn probe_calls(&self) -> u32 {
        self.state.lock().probe_calls
    }

    pub fn graceful_sent(&self) -> Vec<u32> {
        self.state.lock().graceful_sent.clone()
    }

    pub fn force_sent(&self) -> Vec<u32> {
        self.state.lock().force_sent.clone()
    }

    pub fn container_stops(&self) -> Vec<String> {
        self.state.lock().container_stops.clone()
    }

    pub fn is_port_occupied(&self, port: u16) -> bool {
        self.state.lock().ports.contains_key(&port)
    }

    fn kill(state: &mut WorldState, pid: u32) {
        state.alive.remove(&pid);
        if let Some(port) = state.pid_ports.remove(&pid) {
            if let Some(occupants) = state.ports.get_mut(&port) {
                occupants.processes.retain(|p| p.pid != pid);
                if occupants.is_empty() {
                    state.ports.remove(&port);
                }
            }
        }
    }
}

#[async_trait]
impl PortProbe for MockWorld {
    async fn is_occupied(&self, port: u16) -> Result<bool> {
        let mut state = self.state.lock();
        state.probe_calls += 1;
        if state.probe_down {
            return Err(Error::ProbeUnavailable("mock probe down".to_string()));
        }
        Ok(state.ports.contains_key(&port))
    }

    async fn occupants(&self, port: u16) -> Result<PortOccupants> {
        let state = self.state.lock();
        if state.probe_down {
            return Err(Error::ProbeUnavailable("mock probe down".to_string()));
        }
        Ok(state.ports.get(&port).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ProcessControl for MockWorld {
    async fn graceful_stop(&self, pid: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.graceful_sent.push(pid);
        if !state.stubborn.contains(&pid) {
            MockWorld::kill(&mut state, pid);
        }
        Ok(())
    }

    async fn force_stop(&self, pid: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.force_sent.push(pid);
        MockWorld::kill(&mut state, pid);
        Ok(())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().alive.contains(&pid)
    }
}

#[async_trait]
impl ContainerControl for MockWorld {
    async fn stop(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.container_stops.push(name.to_string());
        if let Some(port) = state.container_ports.remove(name) {
            if let Some(occupants) = state.ports.get_mut(&port) {
                occupants.containers.retain(|c| c.name != name);
                if occupants.is_empty() {
                    state.ports.remove(&port);
                }
            }
        }
        Ok(())
    }
}
