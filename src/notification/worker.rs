//! The delivery worker is the consumer side of the notification queue. It
//! runs every queued task as its own tokio task so channels stay isolated
//! from one another.

use crate::core::{DeliveryReport, NotificationTask};
use crate::internal_metrics::Metrics;
use async_channel::Receiver;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The `DeliveryWorker` actor.
pub struct DeliveryWorker {
    task_rx: Receiver<NotificationTask>,
    max_in_flight: usize,
    report_tx: broadcast::Sender<DeliveryReport>,
    metrics: Arc<Metrics>,
}

impl DeliveryWorker {
    /// Creates a new `DeliveryWorker`.
    ///
    /// At most `max_in_flight` attempts run at once; a value of zero is
    /// treated as one.
    pub fn new(
        task_rx: Receiver<NotificationTask>,
        max_in_flight: usize,
        report_tx: broadcast::Sender<DeliveryReport>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            task_rx,
            max_in_flight: max_in_flight.max(1),
            report_tx,
            metrics,
        }
    }

    /// Runs the worker's main loop until shutdown or until the queue closes,
    /// then waits for attempts already in flight.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut in_flight = JoinSet::new();
        info!(max_in_flight = self.max_in_flight, "DeliveryWorker started.");

        loop {
            let task = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("DeliveryWorker received shutdown signal.");
                    break;
                }
                result = self.task_rx.recv() => match result {
                    Ok(task) => task,
                    Err(_) => {
                        info!("Notification queue closed. Shutting down DeliveryWorker.");
                        break;
                    }
                }
            };

            while let Some(result) = in_flight.try_join_next() {
                log_join_error(result);
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    warn!(
                        channel = task.channel.name(),
                        "Shutdown while waiting for a delivery slot; task dropped."
                    );
                    break;
                }
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                }
            };

            debug!(?task, "Starting delivery attempt");
            let report_tx = self.report_tx.clone();
            let metrics = self.metrics.clone();
            in_flight.spawn(async move {
                let report = task.execute().await;
                drop(permit);
                publish(&report_tx, &metrics, report);
            });
        }

        let dropped = self.task_rx.len();
        if dropped > 0 {
            warn!("DeliveryWorker exiting with {} undelivered tasks in the queue.", dropped);
        }
        if !in_flight.is_empty() {
            debug!("Waiting for {} in-flight deliveries.", in_flight.len());
        }
        while let Some(result) = in_flight.join_next().await {
            log_join_error(result);
        }
        info!("DeliveryWorker finished.");
    }
}

fn publish(
    report_tx: &broadcast::Sender<DeliveryReport>,
    metrics: &Metrics,
    report: DeliveryReport,
) {
    metrics.record_delivery(&report);
    // No subscribers is fine; the report is only diagnostic.
    let _ = report_tx.send(report);
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Delivery task panicked");
    }
}
