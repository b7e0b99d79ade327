use crate::output::UserOutput;
use port_warden::resolver::WardenEvent;
use port_warden::{Monitor, MonitorConfig, Warden};
use std::sync::Arc;
use std::time::Duration;

pub async fn run_monitor(
    warden: Arc<Warden>,
    interval_secs: u64,
    threshold: usize,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let environment = warden.resolve()?;
    out.status(&format!(
        "Monitoring {} every {}s (alert at {} conflict(s)). Ctrl-C to stop.",
        environment, interval_secs, threshold
    ));

    let monitor = Arc::new(Monitor::new(
        warden.clone(),
        MonitorConfig {
            interval: Duration::from_secs(interval_secs),
            alert_threshold: threshold,
        },
    ));

    let mut events = warden.subscribe();
    let cancel = monitor.cancellation_token();

    let runner = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.run().await })
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                break;
            }
            event = events.recv() => match event {
                Ok(WardenEvent::ScanCompleted { environment, conflicts }) => {
                    if conflicts > 0 {
                        out.warning(&format!("{}: {} conflict(s)", environment, conflicts));
                    }
                }
                Ok(WardenEvent::ThresholdAlert { environment, conflicts, limit }) => {
                    out.error(&format!(
                        "ALERT {}: {} conflict(s) (threshold {})",
                        environment, conflicts, limit
                    ));
                }
                Ok(WardenEvent::Switched { to, .. }) => {
                    out.status(&format!("Environment switched to {}", to));
                }
                Err(_) => break,
            }
        }
    }

    runner.await.ok();
    out.blank();
    out.status(&format!(
        "Collected {} trend sample(s)",
        monitor.trend().len()
    ));
    Ok(())
}
