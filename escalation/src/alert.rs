//! Alert delivery channels.

use async_trait::async_trait;
use tracing::error;

use crate::finding::Finding;

/// Destination for escalated findings.
///
/// Implementations deliver to whatever is on call: a log stream, a
/// webhook, a pager. Delivery failures bubble up to the sink, which
/// swallows them; a channel must never assume its errors stop anything.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn notify(&self, finding: &Finding) -> anyhow::Result<()>;
}

/// Channel that raises findings on the `alert` log target.
///
/// The default in deployments whose alerting scrapes structured logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    async fn notify(&self, finding: &Finding) -> anyhow::Result<()> {
        error!(
            target: "alert",
            finding_id = %finding.id,
            severity = %finding.severity,
            source = finding.resource(),
            "{}",
            finding.description
        );
        Ok(())
    }
}
