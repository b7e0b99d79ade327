//! Isolation validation: pure functions over the registry, no I/O.
//!
//! Two guarantees are checked. Boundaries: every configured port of an
//! environment lies inside that environment's declared range. Cross-
//! environment: no two environments' ranges overlap, and no service name is
//! assigned the numerically same port in two environments.

use crate::conflict::{Conflict, ConflictKind, Severity};
use crate::registry::{Environment, Registry};
use std::sync::Arc;

pub struct IsolationValidator {
    registry: Arc<Registry>,
}

impl IsolationValidator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Every configured port must satisfy `range.start <= port <= range.end`.
    /// Violations surface as `range_violation`; nothing is corrected silently.
    pub fn validate_boundaries(&self, env: &Environment) -> Vec<Conflict> {
        env.assignments()
            .filter(|&(_, port)| !env.range.contains(port))
            .map(|(service, port)| Conflict {
                kind: ConflictKind::RangeViolation,
                severity: Severity::High,
                port,
                services: vec![service.to_string()],
                environments: vec![env.name.clone()],
                occupants: None,
                detail: format!(
                    "'{}' assigned {} outside the {} range {}",
                    service, port, env.name, env.range
                ),
            })
            .collect()
    }

    /// Range overlaps are reported per offending pair, never merged.
    /// Same-named services with numerically equal ports across environments
    /// are a port-level conflict tagged with both environments.
    pub fn validate_cross_environment(&self, env: &Environment) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for other in self.registry.others(&env.name) {
            if env.range.overlaps(&other.range) {
                conflicts.push(Conflict {
                    kind: ConflictKind::RangeOverlap,
                    severity: Severity::High,
                    port: env.range.start.max(other.range.start),
                    services: Vec::new(),
                    environments: vec![env.name.clone(), other.name.clone()],
                    occupants: None,
                    detail: format!(
                        "range {} ({}) overlaps {} ({})",
                        env.range, env.name, other.range, other.name
                    ),
                });
            }

            for (service, port) in env.assignments() {
                if other.port_of(service) == Some(port) {
                    conflicts.push(Conflict {
                        kind: ConflictKind::DuplicateAssignment,
                        severity: Severity::Critical,
                        port,
                        services: vec![service.to_string()],
                        environments: vec![env.name.clone(), other.name.clone()],
                        occupants: None,
                        detail: format!(
                            "'{}' uses port {} in both {} and {}",
                            service, port, env.name, other.name
                        ),
                    });
                }
            }
        }

        conflicts
    }

    /// Boundaries plus cross-environment, in that order.
    pub fn validate(&self, env: &Environment) -> Vec<Conflict> {
        let mut conflicts = self.validate_boundaries(env);
        conflicts.extend(self.validate_cross_environment(env));
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{IsolationLevel, PortRange};
    use std::collections::BTreeMap;

    fn make_env(name: &str, start: u16, end: u16, services: &[(&str, u16)]) -> Environment {
        Environment {
            name: name.into(),
            range: PortRange::new(start, end),
            services: services
                .iter()
                .map(|&(s, p)| (s.to_string(), p))
                .collect::<BTreeMap<_, _>>(),
            isolation: IsolationLevel::Strict,
            auto_resolve: false,
            allow_fallback: true,
            priority: 0,
        }
    }

    fn registry_of(envs: Vec<Environment>) -> Arc<Registry> {
        let mut registry = Registry::builtin();
        registry.environments.clear();
        registry.fallback = envs[0].name.clone();
        for env in envs {
            registry.environments.insert(env.name.clone(), env);
        }
        Arc::new(registry)
    }

    #[test]
    fn in_range_ports_pass_boundaries() {
        let env = make_env("dev", 21000, 21999, &[("api", 21001), ("db", 21999)]);
        let validator = IsolationValidator::new(registry_of(vec![env.clone()]));
        assert!(validator.validate_boundaries(&env).is_empty());
    }

    #[test]
    fn out_of_range_port_is_flagged_exactly() {
        let env = make_env("dev", 21000, 21999, &[("api", 21001), ("db", 5432)]);
        let validator = IsolationValidator::new(registry_of(vec![env.clone()]));

        let conflicts = validator.validate_boundaries(&env);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::RangeViolation);
        assert_eq!(conflicts[0].severity, Severity::High);
        assert_eq!(conflicts[0].port, 5432);
        assert_eq!(conflicts[0].services, vec!["db"]);
    }

    #[test]
    fn overlapping_ranges_flagged_per_pair() {
        let dev = make_env("dev", 21000, 21999, &[]);
        let qa = make_env("qa", 21500, 22499, &[]);
        let stage = make_env("stage", 21900, 22100, &[]);
        let validator =
            IsolationValidator::new(registry_of(vec![dev.clone(), qa.clone(), stage.clone()]));

        let conflicts = validator.validate_cross_environment(&dev);
        let overlaps: Vec<_> = conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::RangeOverlap)
            .collect();
        // dev overlaps qa and stage: two conflicts, not one merged record.
        assert_eq!(overlaps.len(), 2);
    }

    #[test]
    fn disjoint_ranges_produce_nothing() {
        let dev = make_env("dev", 21000, 21999, &[("api", 21001)]);
        let qa = make_env("qa", 22000, 22999, &[("api", 22001)]);
        let validator = IsolationValidator::new(registry_of(vec![dev.clone(), qa]));
        assert!(validator.validate_cross_environment(&dev).is_empty());
    }

    #[test]
    fn equal_port_same_service_is_critical_with_both_environments() {
        let dev = make_env("dev", 21000, 21999, &[("api", 21001)]);
        let qa = make_env("qa", 20000, 22999, &[("api", 21001)]);
        let validator = IsolationValidator::new(registry_of(vec![dev.clone(), qa]));

        let conflicts = validator.validate_cross_environment(&dev);
        let dup = conflicts
            .iter()
            .find(|c| c.kind == ConflictKind::DuplicateAssignment)
            .expect("duplicate assignment expected");
        assert_eq!(dup.severity, Severity::Critical);
        assert_eq!(dup.environments, vec!["dev", "qa"]);
        assert_eq!(dup.port, 21001);
    }
}
