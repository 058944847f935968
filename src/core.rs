//! Core domain types and service traits for AlarmWatch
//!
//! This module defines the values that flow through the alarm dispatch
//! pipeline and the trait contracts for the collaborators the dispatcher
//! drives: the durable alarm log and the notification channels.

use crate::alarm_log::LogError;
use crate::notification::DeliveryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// A parsed alarm notification handed to the pipeline by the field-protocol
/// stack (or the built-in sensor simulator).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlarmEvent {
    /// Occurrence time reported by the source, if it supplied one.
    pub occurred_at: Option<DateTime<Utc>>,
    /// The alarm text, passed to the channels verbatim.
    pub message: String,
    /// Local wall-clock time at which the event was received.
    pub received_at: DateTime<Utc>,
}

impl AlarmEvent {
    /// Creates an event stamped with the current local time.
    pub fn new(occurred_at: Option<DateTime<Utc>>, message: impl Into<String>) -> Self {
        Self {
            occurred_at,
            message: message.into(),
            received_at: Utc::now(),
        }
    }

    /// Checks that the event carries message content worth notifying about.
    pub fn validate(&self) -> Result<(), MalformedEventError> {
        if self.message.trim().is_empty() {
            return Err(MalformedEventError::MissingMessage);
        }
        Ok(())
    }
}

/// An inbound event that cannot be dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedEventError {
    #[error("alarm event has no message text")]
    MissingMessage,
}

/// One row of the durable alarm log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    #[serde(rename = "logged_at")]
    pub written_at: DateTime<Utc>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub message: String,
}

impl LogRecord {
    pub fn from_event(event: &AlarmEvent, written_at: DateTime<Utc>) -> Self {
        Self {
            written_at,
            occurred_at: event.occurred_at,
            message: event.message.clone(),
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Durable, append-only record of every alarm the pipeline receives.
pub trait AlarmRecorder: Send + Sync {
    /// Appends one record for `event`.
    ///
    /// Implementations must write each record as a whole unit even when
    /// called concurrently.
    fn append(&self, event: &AlarmEvent) -> Result<(), LogError>;
}

/// How a channel turns its recipient list into delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// One attempt per recipient (SMS).
    PerRecipient,
    /// A single attempt addressed to every recipient at once (email).
    Batched,
}

/// A best-effort delivery mechanism for alarm notifications.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// A short, unique name for the channel (e.g., "sms", "email").
    /// Used for logging and metrics.
    fn name(&self) -> &str;

    /// The configured recipients of this channel.
    fn recipients(&self) -> &[String];

    fn fan_out(&self) -> FanOut;

    /// Delivers `message` to `recipients`.
    ///
    /// # Returns
    /// * `Ok(())` if the transport accepted the message
    /// * `Err(DeliveryError)` on a status, transport, or timeout failure
    async fn send(
        &self,
        recipients: &[String],
        subject: Option<&str>,
        message: &str,
    ) -> Result<(), DeliveryError>;
}

/// A single delivery attempt for one channel and its recipient(s).
#[derive(Clone)]
pub struct NotificationTask {
    pub channel: Arc<dyn NotificationChannel>,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub message: String,
}

impl fmt::Debug for NotificationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationTask")
            .field("channel", &self.channel.name())
            .field("recipients", &self.recipients)
            .field("subject", &self.subject)
            .field("message", &self.message)
            .finish()
    }
}

impl NotificationTask {
    /// Expands a channel into the delivery attempts needed for one alarm.
    ///
    /// A channel with no recipients yields no tasks.
    pub fn plan(
        channel: &Arc<dyn NotificationChannel>,
        subject: Option<&str>,
        message: &str,
    ) -> Vec<NotificationTask> {
        let recipients = channel.recipients();
        if recipients.is_empty() {
            return Vec::new();
        }

        let task = |recipients: Vec<String>| NotificationTask {
            channel: channel.clone(),
            recipients,
            subject: subject.map(str::to_string),
            message: message.to_string(),
        };

        match channel.fan_out() {
            FanOut::PerRecipient => recipients
                .iter()
                .map(|recipient| task(vec![recipient.clone()]))
                .collect(),
            FanOut::Batched => vec![task(recipients.to_vec())],
        }
    }

    /// Runs the delivery attempt and describes how it went.
    pub async fn execute(self) -> DeliveryReport {
        let start = Instant::now();
        let outcome = self
            .channel
            .send(&self.recipients, self.subject.as_deref(), &self.message)
            .await;
        DeliveryReport {
            channel: self.channel.name().to_string(),
            recipients: self.recipients,
            outcome,
            elapsed: start.elapsed(),
        }
    }
}

/// The result of one delivery attempt, published to the diagnostics sink.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub channel: String,
    pub recipients: Vec<String>,
    pub outcome: Result<(), DeliveryError>,
    pub elapsed: Duration,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
