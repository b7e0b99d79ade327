//! Fallback port allocation: bounded, deterministic linear probing.

use crate::conflict::reserved;
use crate::error::{Error, Result};
use crate::probe::PortProbe;
use crate::registry::Environment;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound on probe attempts for one search.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Finds a free replacement port inside an environment's range.
///
/// The search is a linear probe upward from the original port, skipping
/// reserved ports without spending an attempt on them, bounded both by the
/// attempt budget and by the range ceiling. Results are memoized per
/// (environment, original port) and re-verified before reuse, so repeated
/// calls under unchanged occupancy return the same port.
pub struct FallbackAllocator {
    probe: Arc<dyn PortProbe>,
    max_attempts: u32,
    /// (environment name, original port) → last granted fallback.
    memo: Mutex<HashMap<(String, u16), u16>>,
}

impl FallbackAllocator {
    pub fn new(probe: Arc<dyn PortProbe>, max_attempts: u32) -> Self {
        Self {
            probe,
            max_attempts,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Find a free port strictly above `original_port`, never beyond the
    /// environment's range ceiling.
    pub async fn find_fallback(&self, original_port: u16, env: &Environment) -> Result<u16> {
        let key = (env.name.clone(), original_port);

        // A memoized answer is reused only if still free; occupancy may have
        // changed since it was granted.
        let memoized = self.memo.lock().get(&key).copied();
        if let Some(port) = memoized {
            if matches!(self.probe.is_occupied(port).await, Ok(false)) {
                return Ok(port);
            }
            self.memo.lock().remove(&key);
        }

        let mut attempts = 0u32;
        let mut candidate = original_port;

        loop {
            candidate = match candidate.checked_add(1) {
                Some(next) if next <= env.range.end => next,
                _ => {
                    return Err(Error::NoFallbackAvailable {
                        port: original_port,
                        attempts,
                    })
                }
            };

            // Reserved ports are skipped outright, costing no attempt.
            if reserved::is_reserved(candidate) {
                continue;
            }

            if attempts >= self.max_attempts {
                return Err(Error::NoFallbackAvailable {
                    port: original_port,
                    attempts,
                });
            }
            attempts += 1;

            let occupied = self.probe.is_occupied(candidate).await.unwrap_or(true);
            if !occupied {
                tracing::debug!(
                    original = original_port,
                    fallback = candidate,
                    attempts,
                    environment = %env.name,
                    "fallback port found"
                );
                self.memo.lock().insert(key, candidate);
                return Ok(candidate);
            }
        }
    }

    /// Drop all memoized results. Called on environment switch.
    pub fn clear(&self) {
        self.memo.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{IsolationLevel, PortRange};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProbe {
        occupied: HashSet<u16>,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(occupied: &[u16]) -> Self {
            Self {
                occupied: occupied.iter().copied().collect(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl PortProbe for ScriptedProbe {
        async fn is_occupied(&self, port: u16) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.occupied.contains(&port))
        }

        async fn occupants(&self, _port: u16) -> Result<crate::probe::PortOccupants> {
            Ok(Default::default())
        }
    }

    fn dev_env() -> Environment {
        Environment {
            name: "development".into(),
            range: PortRange::new(21000, 21999),
            services: BTreeMap::new(),
            isolation: IsolationLevel::Strict,
            auto_resolve: true,
            allow_fallback: true,
            priority: 10,
        }
    }

    #[tokio::test]
    async fn probes_linearly_until_free() {
        // 21002-21005 occupied, 21006 free: exactly 5 probe calls.
        let probe = Arc::new(ScriptedProbe::new(&[21002, 21003, 21004, 21005]));
        let allocator = FallbackAllocator::new(probe.clone(), DEFAULT_MAX_ATTEMPTS);

        let port = allocator.find_fallback(21001, &dev_env()).await.unwrap();
        assert_eq!(port, 21006);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn repeated_calls_return_same_port() {
        let probe = Arc::new(ScriptedProbe::new(&[21002]));
        let allocator = FallbackAllocator::new(probe, DEFAULT_MAX_ATTEMPTS);
        let env = dev_env();

        let first = allocator.find_fallback(21001, &env).await.unwrap();
        let second = allocator.find_fallback(21001, &env).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, 21003);
    }

    #[tokio::test]
    async fn result_is_above_original_and_within_range() {
        let probe = Arc::new(ScriptedProbe::new(&[]));
        let allocator = FallbackAllocator::new(probe, DEFAULT_MAX_ATTEMPTS);
        let env = dev_env();

        let port = allocator.find_fallback(21500, &env).await.unwrap();
        assert!(port > 21500);
        assert!(port <= env.range.end);
    }

    #[tokio::test]
    async fn range_ceiling_exhausts_search() {
        let probe = Arc::new(ScriptedProbe::new(&[21998, 21999]));
        let allocator = FallbackAllocator::new(probe, DEFAULT_MAX_ATTEMPTS);

        let err = allocator.find_fallback(21997, &dev_env()).await.unwrap_err();
        assert!(matches!(err, Error::NoFallbackAvailable { port: 21997, .. }));
    }

    #[tokio::test]
    async fn attempt_budget_bounds_search() {
        // Everything occupied: the search must stop at the budget, not the
        // range ceiling.
        let occupied: Vec<u16> = (21000..22000).collect();
        let probe = Arc::new(ScriptedProbe::new(&occupied));
        let allocator = FallbackAllocator::new(probe.clone(), 10);

        let err = allocator.find_fallback(21001, &dev_env()).await.unwrap_err();
        assert!(matches!(err, Error::NoFallbackAvailable { attempts: 10, .. }));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn clear_forgets_memoized_ports() {
        let probe = Arc::new(ScriptedProbe::new(&[]));
        let allocator = FallbackAllocator::new(probe.clone(), DEFAULT_MAX_ATTEMPTS);
        let env = dev_env();

        allocator.find_fallback(21001, &env).await.unwrap();
        let calls_before = probe.calls.load(Ordering::SeqCst);
        allocator.clear();
        allocator.find_fallback(21001, &env).await.unwrap();
        // A fresh search ran instead of a memo re-verification.
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls_before * 2);
    }
}
