//! Notification channel doubles.

use alarmwatch::core::{FanOut, NotificationChannel};
use alarmwatch::notification::DeliveryError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call to `NotificationChannel::send`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub message: String,
}

/// A channel that records every send and answers with a fixed outcome.
#[derive(Clone, Debug)]
pub struct RecordingChannel {
    name: String,
    recipients: Vec<String>,
    fan_out: FanOut,
    failure: Option<DeliveryError>,
    delay: Duration,
    pub sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl RecordingChannel {
    pub fn new(name: &str, recipients: &[&str], fan_out: FanOut) -> Self {
        Self {
            name: name.to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            fan_out,
            failure: None,
            delay: Duration::ZERO,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Makes every send fail with `error` after recording it.
    pub fn failing_with(mut self, error: DeliveryError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Makes every send take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn fan_out(&self) -> FanOut {
        self.fan_out
    }

    async fn send(
        &self,
        recipients: &[String],
        subject: Option<&str>,
        message: &str,
    ) -> Result<(), DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent.lock().unwrap().push(SentNotification {
            recipients: recipients.to_vec(),
            subject: subject.map(str::to_string),
            message: message.to_string(),
        });
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// A channel whose remote end never answers; it gives up after `timeout`
/// the same way the real channels do.
#[derive(Clone, Debug)]
pub struct HangingChannel {
    recipients: Vec<String>,
    timeout: Duration,
}

impl HangingChannel {
    pub fn new(recipients: &[&str], timeout: Duration) -> Self {
        Self {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            timeout,
        }
    }
}

#[async_trait]
impl NotificationChannel for HangingChannel {
    fn name(&self) -> &str {
        "hanging"
    }

    fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn fan_out(&self) -> FanOut {
        FanOut::Batched
    }

    async fn send(
        &self,
        _recipients: &[String],
        _subject: Option<&str>,
        _message: &str,
    ) -> Result<(), DeliveryError> {
        match tokio::time::timeout(self.timeout, std::future::pending::<()>()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        }
    }
}
