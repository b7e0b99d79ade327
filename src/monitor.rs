//! Periodic conflict monitoring.
//!
//! Re-scans the active environment on a fixed interval, records a trend
//! sample per scan, and raises a threshold alert when the conflict count
//! crosses the configured limit. A scan is skipped outright while a
//! resolution for the same environment is in flight; interleaving a scan
//! with remediation would observe half-applied state.

use crate::conflict::Severity;
use crate::engine::Warden;
use crate::resolver::WardenEvent;
use crate::ring::Ring;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trend samples retained (at the default interval, about an hour).
pub const TREND_CAPACITY: usize = 120;

/// One completed scan, bucketed by severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendSample {
    pub at: DateTime<Utc>,
    pub environment: String,
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// Conflict count at or above which an alert event fires.
    pub alert_threshold: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            alert_threshold: 3,
        }
    }
}

pub struct Monitor {
    warden: Arc<Warden>,
    config: MonitorConfig,
    trends: Mutex<Ring<TrendSample>>,
    cancel: CancellationToken,
}

impl Monitor {
    pub fn new(warden: Arc<Warden>, config: MonitorConfig) -> Self {
        Self {
            warden,
            config,
            trends: Mutex::new(Ring::new(TREND_CAPACITY)),
            cancel: CancellationToken::new(),
        }
    }

    /// Token for external shutdown (Ctrl-C handlers, tests).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Oldest-to-newest samples.
    pub fn trend(&self) -> Vec<TrendSample> {
        self.trends.lock().to_vec()
    }

    /// Scan loop; returns when cancelled. Failed scans back off with jitter
    /// instead of hammering a broken probe on every tick.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("monitor cancelled");
                    return;
                }
                _ = interval.tick() => {}
            }

            match self.scan_once().await {
                Ok(true) => consecutive_failures = 0,
                Ok(false) => {} // suppressed; not a failure
                Err(e) => {
                    consecutive_failures += 1;
                    let delay = backoff_delay(consecutive_failures);
                    tracing::warn!(
                        error = %e,
                        consecutive_failures,
                        backoff_ms = delay.as_millis() as u64,
                        "monitor scan failed"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One scan cycle. Returns Ok(false) when suppressed by an in-flight
    /// resolution.
    pub async fn scan_once(&self) -> crate::error::Result<bool> {
        let environment = self.warden.resolve()?;

        if self.warden.resolution_in_flight(&environment) {
            tracing::debug!(environment = %environment, "scan suppressed: resolution in flight");
            return Ok(false);
        }

        let conflicts = self.warden.get_conflicts(&environment).await?;
        let sample = bucket(&environment, &conflicts.iter().map(|c| c.severity).collect::<Vec<_>>());

        tracing::debug!(
            environment = %environment,
            total = sample.total,
            critical = sample.critical,
            "scan complete"
        );
        self.trends.lock().push(sample.clone());

        self.warden.publish(WardenEvent::ScanCompleted {
            environment: environment.clone(),
            conflicts: sample.total,
        });
        if sample.total >= self.config.alert_threshold {
            tracing::warn!(
                environment = %environment,
                conflicts = sample.total,
                threshold = self.config.alert_threshold,
                "conflict threshold crossed"
            );
            self.warden.publish(WardenEvent::ThresholdAlert {
                environment,
                conflicts: sample.total,
                limit: self.config.alert_threshold,
            });
        }

        Ok(true)
    }
}

fn bucket(environment: &str, severities: &[Severity]) -> TrendSample {
    let mut sample = TrendSample {
        at: Utc::now(),
        environment: environment.to_string(),
        total: severities.len(),
        critical: 0,
        high: 0,
        medium: 0,
        low: 0,
    };
    for severity in severities {
        match severity {
            Severity::Critical => sample.critical += 1,
            Severity::High => sample.high += 1,
            Severity::Medium => sample.medium += 1,
            Severity::Low => sample.low += 1,
        }
    }
    sample
}

/// Capped exponential backoff with jitter: 1s, 2s, 4s … 60s, ±50%.
/// Jitter keeps repeated failures from synchronizing across monitors.
fn backoff_delay(consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return Duration::ZERO;
    }
    let exponent = consecutive_failures.saturating_sub(1).min(6);
    let base_secs = 2u64.pow(exponent).min(60);

    use rand::Rng;
    let jitter = (base_secs as f64 * 0.5) as u64;
    let min = base_secs.saturating_sub(jitter);
    let max = base_secs.saturating_add(jitter);
    let secs = if min < max {
        rand::thread_rng().gen_range(min..=max)
    } else {
        base_secs
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0), Duration::ZERO);
        for failures in 1..12 {
            let delay = backoff_delay(failures);
            // Base is capped at 60s; jitter adds at most 50%.
            assert!(delay <= Duration::from_secs(90));
        }
        let late = backoff_delay(10);
        assert!(late >= Duration::from_secs(30));
    }

    #[test]
    fn bucketing_counts_by_severity() {
        let sample = bucket(
            "development",
            &[
                Severity::Critical,
                Severity::High,
                Severity::High,
                Severity::Low,
            ],
        );
        assert_eq!(sample.total, 4);
        assert_eq!(sample.critical, 1);
        assert_eq!(sample.high, 2);
        assert_eq!(sample.medium, 0);
        assert_eq!(sample.low, 1);
    }
}
