//! A channel that sends SMS through a cellular router's HTTP gateway.

use crate::config::SmsConfig;
use crate::core::{FanOut, NotificationChannel};
use crate::notification::DeliveryError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Posts `{number, message}` to the gateway once per recipient.
#[derive(Debug, Clone)]
pub struct SmsChannel {
    client: Client,
    gateway_url: String,
    username: String,
    password: String,
    recipients: Vec<String>,
    timeout: Duration,
}

impl SmsChannel {
    /// Creates a new `SmsChannel` from its configuration section.
    pub fn new(config: &SmsConfig) -> Result<Self, DeliveryError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            gateway_url: config.gateway_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            recipients: config.recipients.clone(),
            timeout,
        })
    }

    async fn send_one(&self, number: &str, message: &str) -> Result<(), DeliveryError> {
        let payload = json!({ "number": number, "message": message });
        let request = self
            .client
            .post(&self.gateway_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(DeliveryError::Timeout(self.timeout)),
            Ok(Err(e)) => {
                error!(error = %e, "HTTP request to SMS gateway failed");
                return Err(DeliveryError::Transport(e.to_string()));
            }
            Err(_) => return Err(DeliveryError::Timeout(self.timeout)),
        };

        let status = response.status();
        if status == StatusCode::OK {
            info!("SMS sent to {}", number);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Failed to send SMS");
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn name(&self) -> &str {
        "sms"
    }

    fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn fan_out(&self) -> FanOut {
        FanOut::PerRecipient
    }

    /// Sends the message to each number in turn; the first failure is returned.
    #[instrument(skip(self, message), fields(count = recipients.len()))]
    async fn send(
        &self,
        recipients: &[String],
        _subject: Option<&str>,
        message: &str,
    ) -> Result<(), DeliveryError> {
        let mut first_error = None;
        for number in recipients {
            debug!(number = %number, "Posting SMS to gateway");
            if let Err(e) = self.send_one(number, message).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sms_config(server: &MockServer, timeout_seconds: u64) -> SmsConfig {
        SmsConfig {
            gateway_url: format!("{}/api/sms/send", server.uri()),
            username: "admin".to_string(),
            password: "password".to_string(),
            recipients: vec!["+61412345678".to_string()],
            timeout_seconds,
        }
    }

    #[tokio::test]
    async fn test_sms_send_success() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sms/send"))
            .and(basic_auth("admin", "password"))
            .and(body_json(json!({ "number": "+61412345678", "message": "High temp" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = SmsChannel::new(&sms_config(&server, 5)).unwrap();

        // Act
        let result = channel
            .send(&["+61412345678".to_string()], None, "High temp")
            .await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_sms_server_error_is_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sms/send"))
            .respond_with(ResponseTemplate::new(500).set_body_string("modem busy"))
            .mount(&server)
            .await;

        let channel = SmsChannel::new(&sms_config(&server, 5)).unwrap();
        let result = channel
            .send(&["+61412345678".to_string()], None, "High temp")
            .await;

        assert_eq!(
            result,
            Err(DeliveryError::Status {
                status: 500,
                body: "modem busy".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_sms_only_200_counts_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let channel = SmsChannel::new(&sms_config(&server, 5)).unwrap();
        let result = channel
            .send(&["+61412345678".to_string()], None, "High temp")
            .await;

        assert!(matches!(result, Err(DeliveryError::Status { status: 202, .. })));
    }

    #[tokio::test]
    async fn test_sms_hung_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let channel = SmsChannel::new(&sms_config(&server, 1)).unwrap();
        let result = channel
            .send(&["+61412345678".to_string()], None, "High temp")
            .await;

        assert_eq!(result, Err(DeliveryError::Timeout(Duration::from_secs(1))));
    }

    #[tokio::test]
    async fn test_sms_unreachable_gateway_is_transport_error() {
        let config = SmsConfig {
            gateway_url: "http://127.0.0.1:9/api/sms/send".to_string(),
            username: "admin".to_string(),
            password: "password".to_string(),
            recipients: vec![],
            timeout_seconds: 2,
        };
        let channel = SmsChannel::new(&config).unwrap();
        let result = channel
            .send(&["+61412345678".to_string()], None, "High temp")
            .await;

        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }

    #[tokio::test]
    async fn test_sms_failure_for_one_number_does_not_skip_others() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "number": "+1", "message": "High temp" })))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "number": "+2", "message": "High temp" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = SmsChannel::new(&sms_config(&server, 5)).unwrap();
        let result = channel
            .send(&["+1".to_string(), "+2".to_string()], None, "High temp")
            .await;

        assert!(matches!(result, Err(DeliveryError::Status { status: 500, .. })));
    }
}
