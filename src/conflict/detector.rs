//! Conflict detection: live probing plus static analysis, cached per
//! environment with a short TTL.

use super::reserved;
use super::types::{Conflict, ConflictKind, Severity};
use crate::error::Result;
use crate::probe::PortProbe;
use crate::registry::Environment;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default validity window for a cached scan.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

struct CachedScan {
    at: Instant,
    conflicts: Vec<Conflict>,
}

/// Aggregates probe results and static checks into a flat conflict list.
///
/// Scans are cached per environment; a hit younger than the TTL is returned
/// as-is, anything older is recomputed. An environment switch invalidates
/// the cache outright.
pub struct ConflictDetector {
    probe: Arc<dyn PortProbe>,
    ttl: Duration,
    /// Keyed by environment name. parking_lot, never held across await.
    cache: Mutex<HashMap<String, CachedScan>>,
}

impl ConflictDetector {
    pub fn new(probe: Arc<dyn PortProbe>, ttl: Duration) -> Self {
        Self {
            probe,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Detect conflicts for `env`, serving a fresh-enough cached scan when
    /// one exists.
    #[tracing::instrument(skip(self, env), fields(environment = %env.name))]
    pub async fn detect(&self, env: &Environment) -> Result<Vec<Conflict>> {
        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.get(&env.name) {
                if cached.at.elapsed() < self.ttl {
                    tracing::debug!(
                        age_ms = cached.at.elapsed().as_millis() as u64,
                        "serving cached scan"
                    );
                    return Ok(cached.conflicts.clone());
                }
            }
        }

        let conflicts = self.scan(env).await?;
        self.cache.lock().insert(
            env.name.clone(),
            CachedScan {
                at: Instant::now(),
                conflicts: conflicts.clone(),
            },
        );
        Ok(conflicts)
    }

    /// Drop any cached scan for one environment.
    pub fn invalidate(&self, env_name: &str) {
        self.cache.lock().remove(env_name);
    }

    /// Drop every cached scan. Called on environment switch.
    pub fn invalidate_all(&self) {
        self.cache.lock().clear();
    }

    async fn scan(&self, env: &Environment) -> Result<Vec<Conflict>> {
        let mut conflicts = Vec::new();

        for (service, port) in env.assignments() {
            self.check_occupancy(env, service, port, &mut conflicts)
                .await;

            if let Some(label) = reserved::reservation(port) {
                conflicts.push(Conflict {
                    kind: ConflictKind::ReservedPort,
                    severity: Severity::Medium,
                    port,
                    services: vec![service.to_string()],
                    environments: vec![env.name.clone()],
                    occupants: None,
                    detail: label.to_string(),
                });
            }
        }

        conflicts.extend(duplicate_assignments(env));

        tracing::debug!(count = conflicts.len(), "scan complete");
        Ok(conflicts)
    }

    async fn check_occupancy(
        &self,
        env: &Environment,
        service: &str,
        port: u16,
        conflicts: &mut Vec<Conflict>,
    ) {
        let occupied = match self.probe.is_occupied(port).await {
            Ok(occupied) => occupied,
            Err(e) => {
                // Probe down: assume occupied so the operator is warned
                // rather than launched into a bind failure.
                tracing::warn!(port, error = %e, "probe unavailable, assuming occupied");
                conflicts.push(Conflict {
                    kind: ConflictKind::PortInUse,
                    severity: Severity::High,
                    port,
                    services: vec![service.to_string()],
                    environments: vec![env.name.clone()],
                    occupants: None,
                    detail: format!("probe unavailable ({}), occupancy unknown", e),
                });
                return;
            }
        };

        if !occupied {
            return;
        }

        let occupants = self.probe.occupants(port).await.unwrap_or_default();
        let detail = format!("held by {}", occupants.describe());
        conflicts.push(Conflict {
            kind: ConflictKind::PortInUse,
            severity: Severity::High,
            port,
            services: vec![service.to_string()],
            environments: vec![env.name.clone()],
            occupants: Some(occupants),
            detail,
        });
    }
}

/// Tally port→service multiplicities; one conflict per over-assigned port,
/// listing every claimant.
fn duplicate_assignments(env: &Environment) -> Vec<Conflict> {
    let mut owners: HashMap<u16, Vec<String>> = HashMap::new();
    for (service, port) in env.assignments() {
        owners.entry(port).or_default().push(service.to_string());
    }

    let mut conflicts: Vec<Conflict> = owners
        .into_iter()
        .filter(|(_, services)| services.len() > 1)
        .map(|(port, services)| Conflict {
            kind: ConflictKind::DuplicateAssignment,
            severity: Severity::Critical,
            port,
            detail: format!("claimed by {} services: {}", services.len(), services.join(", ")),
            services,
            environments: vec![env.name.clone()],
            occupants: None,
        })
        .collect();
    conflicts.sort_by_key(|c| c.port);
    conflicts
}
