//! The diagnostics sink for delivery attempts.
//!
//! Every `DeliveryReport` published by the worker ends up here and is turned
//! into an operational log line, which is the only place delivery failures
//! surface to an operator.

use crate::core::DeliveryReport;
use crate::task_manager::TaskManager;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Spawns a task that listens for delivery reports and logs them.
///
/// The task runs until every sender is dropped, so reports from attempts
/// that finish during shutdown are still logged.
pub fn spawn(task_manager: &TaskManager, mut report_rx: broadcast::Receiver<DeliveryReport>) {
    task_manager.spawn("DeliveryLogger", async move {
        info!("DeliveryLogger started.");
        loop {
            match report_rx.recv().await {
                Ok(report) => log_report(&report),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("DeliveryLogger lagged behind and missed {} reports.", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Report channel closed. DeliveryLogger shutting down.");
                    break;
                }
            }
        }
    });
}

/// Logs one delivery report at a level matching its outcome.
pub fn log_report(report: &DeliveryReport) {
    match &report.outcome {
        Ok(()) => info!(
            channel = %report.channel,
            recipients = ?report.recipients,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Notification delivered"
        ),
        Err(e) => error!(
            channel = %report.channel,
            recipients = ?report.recipients,
            elapsed_ms = report.elapsed.as_millis() as u64,
            error = %e,
            "Notification delivery failed"
        ),
    }
}
