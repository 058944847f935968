//! The alarm dispatcher: log, rate-check, then fan out.
//!
//! `Dispatcher::on_alarm` is called once per inbound alarm from whatever
//! context delivers alarms. It never waits on network I/O: delivery is handed
//! to the notification queue and the call returns as soon as the tasks are
//! enqueued.

use crate::core::{
    AlarmEvent, AlarmRecorder, MalformedEventError, NotificationChannel, NotificationTask,
};
use crate::internal_metrics::Metrics;
use crate::notification::email::DEFAULT_SUBJECT;
use crate::rate_limiter::{Admission, RateLimiter};
use async_channel::Sender;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to one alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Admitted; `tasks` delivery attempts were queued.
    Dispatched { tasks: usize },
    /// Within the cooldown window; nothing was sent.
    Suppressed { remaining: Duration },
    /// The event could not be dispatched; it was still logged.
    Rejected(MalformedEventError),
}

pub struct Dispatcher {
    alarm_log: Arc<dyn AlarmRecorder>,
    rate_limiter: Arc<RateLimiter>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    subject: String,
    task_tx: Sender<NotificationTask>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        alarm_log: Arc<dyn AlarmRecorder>,
        rate_limiter: Arc<RateLimiter>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        task_tx: Sender<NotificationTask>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            alarm_log,
            rate_limiter,
            channels,
            subject: DEFAULT_SUBJECT.to_string(),
            task_tx,
            metrics,
        }
    }

    /// Sets the subject passed to channels that use one.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Handles one inbound alarm using the current monotonic time.
    pub fn on_alarm(&self, event: AlarmEvent) -> DispatchOutcome {
        self.on_alarm_at(event, Instant::now())
    }

    /// Handles one inbound alarm observed at `now`.
    pub fn on_alarm_at(&self, event: AlarmEvent, now: Instant) -> DispatchOutcome {
        info!(
            occurred_at = ?event.occurred_at,
            message = %event.message,
            "ALARM RECEIVED"
        );
        self.metrics.alarms_received_total.increment(1);

        // The log write happens before any decision so every alarm is recorded.
        if let Err(e) = self.alarm_log.append(&event) {
            self.metrics.alarm_log_failures_total.increment(1);
            warn!(error = %e, "Failed to log alarm");
        }

        if let Err(e) = event.validate() {
            self.metrics.alarms_malformed_total.increment(1);
            warn!(error = %e, "Alarm not dispatched");
            return DispatchOutcome::Rejected(e);
        }

        if let Admission::Suppressed { remaining } = self.rate_limiter.check(now) {
            self.metrics.alarms_suppressed_total.increment(1);
            info!(
                remaining_seconds = remaining.as_secs(),
                "Alert suppressed due to rate limiting. Next alert allowed in {}s",
                remaining.as_secs()
            );
            return DispatchOutcome::Suppressed { remaining };
        }

        let mut queued = 0;
        for channel in &self.channels {
            for task in NotificationTask::plan(channel, Some(&self.subject), &event.message) {
                debug!(
                    channel = channel.name(),
                    recipients = ?task.recipients,
                    "Queueing notification"
                );
                match self.task_tx.try_send(task) {
                    Ok(()) => queued += 1,
                    Err(e) => {
                        error!(
                            channel = channel.name(),
                            error = %e,
                            "Failed to queue notification"
                        );
                    }
                }
            }
        }

        if queued == 0 {
            warn!("Alarm admitted but no notification channels are configured");
        } else {
            info!(tasks = queued, "Alarm admitted, notifications queued");
        }
        DispatchOutcome::Dispatched { tasks: queued }
    }
}
