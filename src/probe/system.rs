//! System-backed probe and control implementations.
//!
//! Occupancy is established by bind-checking both `127.0.0.1` and `0.0.0.0`
//! (binding loopback can succeed while the wildcard address is taken, so one
//! check is not enough). Occupant attribution shells out to `ss`, then
//! `lsof`, then `docker ps`; each source degrades independently so a missing
//! tool costs attribution detail, not detection.

use super::{ContainerControl, ContainerInfo, PortOccupants, PortProbe, ProcessControl, ProcessInfo};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::TcpListener;
use std::process::Output;
use std::time::Duration;

const TOOL_TIMEOUT: Duration = Duration::from_secs(5);

/// Run an external tool with a timeout, returning raw Output.
async fn run_tool(program: &str, args: &[&str]) -> Result<Output> {
    let cmd_str = format!("{} {}", program, args.join(" "));
    match tokio::time::timeout(
        TOOL_TIMEOUT,
        tokio::process::Command::new(program).args(args).output(),
    )
    .await
    {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(Error::ProbeUnavailable(format!("{}: {}", cmd_str, e))),
        Err(_) => Err(Error::Timeout(cmd_str)),
    }
}

/// Default [`PortProbe`] backed by bind checks and `ss`/`lsof`/`docker`.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        SystemProbe
    }

    fn bind_check(port: u16) -> bool {
        let loopback_free = TcpListener::bind(("127.0.0.1", port)).is_ok();
        let wildcard_free = TcpListener::bind(("0.0.0.0", port)).is_ok();
        !(loopback_free && wildcard_free)
    }

    #[cfg(target_os = "linux")]
    async fn processes_via_ss(port: u16) -> Result<Vec<ProcessInfo>> {
        let filter = format!("sport = :{}", port);
        let output = run_tool("ss", &["-tlnp", &filter]).await?;
        if !output.status.success() {
            return Err(Error::ProbeUnavailable(format!(
                "ss exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut seen = HashSet::new();
        let mut processes = Vec::new();
        for line in stdout.lines().skip(1) {
            let Some(users) = line.split_whitespace().last() else {
                continue;
            };
            for field in users.split(',') {
                let Some(pid) = field
                    .strip_prefix("pid=")
                    .and_then(|s| s.parse::<u32>().ok())
                else {
                    continue;
                };
                if !seen.insert(pid) {
                    continue;
                }
                let name = std::fs::read_to_string(format!("/proc/{}/comm", pid))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                let command = std::fs::read_to_string(format!("/proc/{}/cmdline", pid))
                    .ok()
                    .map(|s| s.replace('\0', " ").trim().to_string())
                    .filter(|s| !s.is_empty());
                processes.push(ProcessInfo { pid, name, command });
            }
        }
        Ok(processes)
    }

    async fn processes_via_lsof(port: u16) -> Result<Vec<ProcessInfo>> {
        let target = format!(":{}", port);
        let output = run_tool("lsof", &["-i", &target, "-P", "-n", "-F", "pcn"]).await?;
        // lsof exits non-zero when nothing matches; that is an empty answer,
        // not a probe failure.
        if !output.status.success() && output.stdout.is_empty() {
            return Ok(Vec::new());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut seen = HashSet::new();
        let mut processes = Vec::new();
        let mut pid: Option<u32> = None;
        let mut name: Option<String> = None;

        let mut flush = |pid: Option<u32>, name: &Option<String>, out: &mut Vec<ProcessInfo>| {
            if let Some(p) = pid {
                if seen.insert(p) {
                    out.push(ProcessInfo {
                        pid: p,
                        name: name.clone().unwrap_or_else(|| "unknown".to_string()),
                        command: name.clone(),
                    });
                }
            }
        };

        // Field format: each process block is a 'p<PID>' line followed by
        // 'c<COMMAND>' and 'n<NAME>' lines.
        for line in stdout.lines() {
            if let Some(rest) = line.strip_prefix('p') {
                flush(pid, &name, &mut processes);
                pid = rest.parse::<u32>().ok();
                name = None;
            } else if let Some(rest) = line.strip_prefix('c') {
                name = Some(rest.to_string());
            }
        }
        flush(pid, &name, &mut processes);
        Ok(processes)
    }

    async fn containers_via_docker(port: u16) -> Vec<ContainerInfo> {
        let output = match run_tool(
            "docker",
            &["ps", "--format", "{{.Names}}\t{{.Ports}}", "--no-trunc"],
        )
        .await
        {
            Ok(o) if o.status.success() => o,
            // Docker absent or down: no container attribution, not an error.
            _ => return Vec::new(),
        };

        let needle = format!(":{}->", port);
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                let (name, ports) = line.split_once('\t')?;
                ports
                    .contains(&needle)
                    .then(|| ContainerInfo {
                        name: name.to_string(),
                    })
            })
            .collect()
    }
}

#[async_trait]
impl PortProbe for SystemProbe {
    async fn is_occupied(&self, port: u16) -> Result<bool> {
        Ok(Self::bind_check(port))
    }

    async fn occupants(&self, port: u16) -> Result<PortOccupants> {
        let own_pid = std::process::id();

        #[cfg(target_os = "linux")]
        let mut processes = match Self::processes_via_ss(port).await {
            Ok(found) if !found.is_empty() => found,
            _ => Self::processes_via_lsof(port).await?,
        };
        #[cfg(not(target_os = "linux"))]
        let mut processes = Self::processes_via_lsof(port).await?;

        // We may be holding the port ourselves (e.g. a reservation listener);
        // never report or act on our own process.
        processes.retain(|p| p.pid != own_pid);

        let containers = Self::containers_via_docker(port).await;
        Ok(PortOccupants {
            processes,
            containers,
        })
    }
}

/// Default [`ProcessControl`] using SIGTERM / SIGKILL via `nix`.
#[derive(Debug, Clone, Default)]
pub struct SignalProcessControl;

impl SignalProcessControl {
    pub fn new() -> Self {
        SignalProcessControl
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessControl for SignalProcessControl {
    async fn graceful_stop(&self, pid: u32) -> Result<()> {
        let pid = crate::error::validate_pid(pid)?;
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM).map_err(|e| {
            Error::ActionExecution {
                action: format!("SIGTERM {}", pid),
                reason: e.to_string(),
            }
        })
    }

    async fn force_stop(&self, pid: u32) -> Result<()> {
        let pid = crate::error::validate_pid(pid)?;
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL).map_err(|e| {
            Error::ActionExecution {
                action: format!("SIGKILL {}", pid),
                reason: e.to_string(),
            }
        })
    }

    async fn is_alive(&self, pid: u32) -> bool {
        match crate::error::validate_pid_for_check(pid) {
            // Signal 0 probes existence without delivering anything.
            Some(pid) => nix::sys::signal::kill(pid, None).is_ok(),
            None => false,
        }
    }
}

#[cfg(not(unix))]
#[async_trait]
impl ProcessControl for SignalProcessControl {
    async fn graceful_stop(&self, pid: u32) -> Result<()> {
        Err(Error::ActionExecution {
            action: format!("stop pid {}", pid),
            reason: "process signalling is only supported on Unix".to_string(),
        })
    }

    async fn force_stop(&self, pid: u32) -> Result<()> {
        self.graceful_stop(pid).await
    }

    async fn is_alive(&self, _pid: u32) -> bool {
        false
    }
}

/// Default [`ContainerControl`] wrapping the `docker` CLI with a timeout.
#[derive(Debug, Clone)]
pub struct DockerContainerControl {
    stop_timeout_secs: u32,
}

impl DockerContainerControl {
    pub fn new() -> Self {
        Self {
            stop_timeout_secs: 10,
        }
    }
}

impl Default for DockerContainerControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerControl for DockerContainerControl {
    async fn stop(&self, name: &str) -> Result<()> {
        let secs = self.stop_timeout_secs.to_string();
        let output = run_tool("docker", &["stop", "-t", &secs, name])
            .await
            .map_err(|e| Error::Container(e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Container(format!(
                "docker stop {} failed: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
