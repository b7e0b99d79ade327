//! Conflict data model.

use crate::probe::PortOccupants;
use serde::{Deserialize, Serialize};

/// What kind of discrepancy was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// The configured port is held by something we do not own.
    PortInUse,
    /// The configured port falls in a reserved or well-known band.
    ReservedPort,
    /// Two or more services are assigned the same port.
    DuplicateAssignment,
    /// A service's port lies outside its environment's range.
    RangeViolation,
    /// Two environments' ranges overlap.
    RangeOverlap,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictKind::PortInUse => "port_in_use",
            ConflictKind::ReservedPort => "reserved_port",
            ConflictKind::DuplicateAssignment => "duplicate_assignment",
            ConflictKind::RangeViolation => "range_violation",
            ConflictKind::RangeOverlap => "range_overlap",
        };
        f.write_str(s)
    }
}

/// Ordinal severity; derived ordering is the ranking rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A detected discrepancy between intended and observed port state.
///
/// Conflicts are produced per scan and live only as long as the detector's
/// cache window; they are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub port: u16,
    /// Owning service name(s). Duplicate assignments list every claimant.
    pub services: Vec<String>,
    /// Environment(s) involved. Cross-environment conflicts list both.
    pub environments: Vec<String>,
    /// Live occupant metadata, when the probe could attribute the port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupants: Option<PortOccupants>,
    pub detail: String,
}

impl Conflict {
    /// Operator-facing remediation hint for conflicts the planner does not
    /// turn into actions, and for conflicts that survive a resolution pass.
    pub fn recommendation(&self) -> String {
        match self.kind {
            ConflictKind::PortInUse => {
                let who = self
                    .occupants
                    .as_ref()
                    .map(|o| o.describe())
                    .unwrap_or_else(|| "unknown occupant".to_string());
                format!(
                    "Port {} is held by {}. Stop it, or move '{}' to a free port.",
                    self.port,
                    who,
                    self.services.join(", ")
                )
            }
            ConflictKind::ReservedPort => format!(
                "Port {} sits in a reserved band ({}). Move '{}' outside it to avoid collisions.",
                self.port,
                self.detail,
                self.services.join(", ")
            ),
            ConflictKind::DuplicateAssignment => format!(
                "Services {} all claim port {}. Assign each a distinct port in the registry.",
                self.services.join(", "),
                self.port
            ),
            ConflictKind::RangeViolation => format!(
                "Port {} for '{}' lies outside the {} range. Reassign it inside the band.",
                self.port,
                self.services.join(", "),
                self.environments.first().map(String::as_str).unwrap_or("?")
            ),
            ConflictKind::RangeOverlap => format!(
                "Environments {} have overlapping port ranges. Separate the bands in the registry.",
                self.environments.join(" and ")
            ),
        }
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} port {}: {}",
            self.severity, self.kind, self.port, self.detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_is_ascending() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn duplicate_recommendation_names_all_claimants() {
        let conflict = Conflict {
            kind: ConflictKind::DuplicateAssignment,
            severity: Severity::Critical,
            port: 21001,
            services: vec!["api".into(), "web".into()],
            environments: vec!["development".into()],
            occupants: None,
            detail: String::new(),
        };
        let rec = conflict.recommendation();
        assert!(rec.contains("api"));
        assert!(rec.contains("web"));
        assert!(rec.contains("21001"));
    }
}
