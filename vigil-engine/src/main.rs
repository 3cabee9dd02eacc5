//! Standalone monitor runner.
//!
//! Runs the engine against the in-memory store and the sandbox surface,
//! for local runs and smoke checks. Production deployments embed
//! [`vigil_engine::ComplianceMonitor`] behind their own wiring instead.

use tracing::info;
use tracing_subscriber::EnvFilter;

use vigil_engine::{ComplianceMonitor, MonitorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = MonitorConfig::from_env();
    info!(
        target: "monitor",
        retention_days = config.retention_days,
        rule_interval_minutes = config.rule_interval_minutes,
        probe_automation = config.probe_automation_enabled,
        "starting vigil monitor"
    );

    let monitor = ComplianceMonitor::in_memory(config)?;
    monitor.start();

    tokio::signal::ctrl_c().await?;
    info!(target: "monitor", "shutdown signal received, stopping schedules");
    monitor.stop();

    let status = monitor.status().await?;
    info!(
        target: "monitor",
        total_events = status.total_events,
        open_violations = status.open_violations,
        open_vulnerabilities = status.open_vulnerabilities,
        "final monitor status"
    );
    Ok(())
}
