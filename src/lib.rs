//! # Port Warden
//!
//! Assigns, validates, and defends non-overlapping TCP port ranges across
//! deployment environments (development, testing, staging, production),
//! detects when a declared port is unexpectedly occupied or misconfigured,
//! and attempts automated or guided remediation.
//!
//! ## Features
//!
//! - **Environment registry**: disjoint port bands and service→port maps per
//!   environment, from built-in defaults or `port-warden.yaml`
//! - **Environment resolution**: prioritized signal variables, then
//!   auto-detection heuristics (compose files, VCS branch, hostname, live
//!   port usage), with a production confirmation gate
//! - **Isolation validation**: range-boundary and cross-environment checks
//! - **Conflict detection**: live probe results plus static analysis, cached
//!   per environment with a short TTL
//! - **Risk-aware remediation**: ordered resolution plans, graceful-then-
//!   forced termination, fallback allocation, dry-run and interactive
//!   approval, post-execution verification
//! - **Monitoring**: periodic scans, trend history, threshold alerts
//!
//! ## Quick Start
//!
//! ```no_run
//! use port_warden::{ExecuteOptions, Warden};
//!
//! # async fn example() -> Result<(), port_warden::Error> {
//! let warden = Warden::builder().build()?;
//! let environment = warden.resolve()?;
//!
//! let conflicts = warden.get_conflicts(&environment).await?;
//! if !conflicts.is_empty() {
//!     let result = warden
//!         .resolve_conflicts(&environment, ExecuteOptions::default())
//!         .await?;
//!     println!("{}", result.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! Every operation is one sequential unit of work; no two resolution passes
//! run against the same environment concurrently, and monitor scans are
//! suppressed while a resolution is in flight. Probe and termination calls
//! are the suspension points; everything else is synchronous computation
//! behind short-lived locks.

pub mod conflict;
pub mod engine;
pub mod error;
pub mod isolation;
pub mod monitor;
pub mod probe;
pub mod registry;
pub mod resolution;
pub mod resolver;
pub mod ring;

// Re-export commonly used types
pub use conflict::{Conflict, ConflictDetector, ConflictKind, Severity};
pub use engine::{Warden, WardenBuilder};
pub use error::{Error, Result};
pub use isolation::IsolationValidator;
pub use monitor::{Monitor, MonitorConfig};
pub use probe::{ContainerControl, PortProbe, ProcessControl};
pub use registry::{Environment, PortRange, Registry};
pub use resolution::{
    ActionKind, ApprovalGate, ExecuteOptions, FinalStatus, ResolutionPlan, ResolutionResult,
    RiskLevel, Strategy,
};
pub use resolver::{SwitchRecord, WardenEvent};
