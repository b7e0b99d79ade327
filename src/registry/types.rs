//! Core registry types.
//!
//! The registry is plain data: each environment's port range, service→port
//! assignments, and isolation policy. It is defined at process start (from
//! built-in defaults or `port-warden.yaml`) and immutable during a run.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive port range owned by one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn span(&self) -> u16 {
        self.end.saturating_sub(self.start)
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// How strictly cross-environment separation is enforced on switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    /// Any cross-environment conflict blocks a switch.
    #[default]
    Strict,
    /// Conflicts are reported but do not block.
    Relaxed,
}

/// A named deployment context with its own port range and service map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    #[serde(skip)]
    pub name: String,

    pub range: PortRange,

    /// Service name → configured port. BTreeMap for deterministic scan order.
    #[serde(default)]
    pub services: BTreeMap<String, u16>,

    #[serde(default)]
    pub isolation: IsolationLevel,

    /// Remediation may run without interactive approval.
    #[serde(default)]
    pub auto_resolve: bool,

    /// Fallback allocation is permitted when a configured port is unusable.
    #[serde(default = "default_true")]
    pub allow_fallback: bool,

    /// Tie-break weight for auto-detection heuristics (higher wins).
    #[serde(default)]
    pub priority: u8,
}

fn default_true() -> bool {
    true
}

impl Environment {
    /// Ports configured for this environment, with owning service names,
    /// in deterministic order.
    pub fn assignments(&self) -> impl Iterator<Item = (&str, u16)> {
        self.services.iter().map(|(name, &port)| (name.as_str(), port))
    }

    pub fn port_of(&self, service: &str) -> Option<u16> {
        self.services.get(service).copied()
    }
}

/// Static description of every known environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub environments: BTreeMap<String, Environment>,

    /// Environment chosen when no signal or heuristic matches.
    #[serde(default = "default_fallback")]
    pub fallback: String,

    /// Selecting `production` requires an explicit confirmation signal.
    #[serde(default = "default_true")]
    pub strict_production: bool,
}

fn default_fallback() -> String {
    "development".to_string()
}

impl Registry {
    /// Built-in registry: four environments on adjacent 1000-port bands.
    ///
    /// Service offsets mirror conventional defaults (…432 for the database,
    /// …379 for the cache) so an operator can read a port and know the band
    /// and the service at a glance.
    pub fn builtin() -> Self {
        let bands: &[(&str, u16, u8)] = &[
            ("development", 21000, 10),
            ("testing", 22000, 20),
            ("staging", 23000, 30),
            ("production", 24000, 40),
        ];

        let mut environments = BTreeMap::new();
        for &(name, base, priority) in bands {
            let services: BTreeMap<String, u16> = [
                ("api", base + 1),
                ("web", base + 2),
                ("worker", base + 3),
                ("cache", base + 379),
                ("database", base + 432),
            ]
            .into_iter()
            .map(|(s, p)| (s.to_string(), p))
            .collect();

            environments.insert(
                name.to_string(),
                Environment {
                    name: name.to_string(),
                    range: PortRange::new(base, base + 999),
                    services,
                    isolation: IsolationLevel::Strict,
                    auto_resolve: name == "development" || name == "testing",
                    allow_fallback: name != "production",
                    priority,
                },
            );
        }

        Registry {
            environments,
            fallback: default_fallback(),
            strict_production: true,
        }
    }

    pub fn get(&self, name: &str) -> Result<&Environment> {
        self.environments
            .get(name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.environments.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }

    /// All environments except `name`, for cross-environment checks.
    pub fn others<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Environment> {
        self.environments
            .values()
            .filter(move |env| env.name != name)
    }

    /// Structural validation: non-inverted ranges, a known fallback, and
    /// every configured service map non-degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.environments.is_empty() {
            return Err(Error::Configuration(
                "registry defines no environments".to_string(),
            ));
        }
        if !self.contains(&self.fallback) {
            return Err(Error::Configuration(format!(
                "fallback environment '{}' is not defined",
                self.fallback
            )));
        }
        for env in self.environments.values() {
            if env.range.start > env.range.end {
                return Err(Error::Configuration(format!(
                    "environment '{}' has inverted range {}",
                    env.name, env.range
                )));
            }
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
