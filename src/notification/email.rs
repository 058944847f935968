//! A channel that sends alarm emails through an SMTP relay.

use crate::config::EmailConfig;
use crate::core::{FanOut, NotificationChannel};
use crate::notification::DeliveryError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{error, info, instrument};

/// Subject used when the dispatcher does not supply one.
pub const DEFAULT_SUBJECT: &str = "BACnet Alarm";

/// Sends one message addressed to every recipient.
///
/// The production transport connects, upgrades with STARTTLS, authenticates,
/// sends and quits for each message; no connection outlives a send.
pub struct EmailChannel<T = AsyncSmtpTransport<Tokio1Executor>> {
    transport: T,
    from: Mailbox,
    recipients: Vec<String>,
    mailboxes: Vec<Mailbox>,
    timeout: Duration,
}

impl EmailChannel {
    /// Creates an SMTP-backed `EmailChannel` from its configuration section.
    pub fn new(config: &EmailConfig) -> Result<Self, DeliveryError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| DeliveryError::Transport(format!("invalid SMTP host: {e}")))?
            .port(config.smtp_port)
            .credentials(credentials)
            .timeout(Some(timeout))
            .build();

        Self::with_transport(transport, config.sender(), config.recipients.clone(), timeout)
    }
}

impl<T> EmailChannel<T>
where
    T: AsyncTransport + Send + Sync,
{
    /// Creates an `EmailChannel` on top of an arbitrary mail transport.
    ///
    /// Every configured address is parsed here, so a mistyped recipient
    /// fails construction instead of every later send.
    pub fn with_transport(
        transport: T,
        from: &str,
        recipients: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let mailboxes = recipients
            .iter()
            .map(|recipient| parse_mailbox(recipient))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            transport,
            from: parse_mailbox(from)?,
            recipients,
            mailboxes,
            timeout,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Builds the plain-text alarm email.
    pub fn build_message(
        &self,
        recipients: &[String],
        subject: Option<&str>,
        body: &str,
    ) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject.unwrap_or(DEFAULT_SUBJECT));
        for recipient in recipients {
            let mailbox = match self.recipients.iter().position(|r| r == recipient) {
                Some(i) => self.mailboxes[i].clone(),
                None => parse_mailbox(recipient)?,
            };
            builder = builder.to(mailbox);
        }
        builder
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Message(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse()
        .map_err(|e| DeliveryError::InvalidAddress(format!("{address}: {e}")))
}

#[async_trait]
impl<T> NotificationChannel for EmailChannel<T>
where
    T: AsyncTransport + Send + Sync + 'static,
    T::Error: std::fmt::Display,
{
    fn name(&self) -> &str {
        "email"
    }

    fn recipients(&self) -> &[String] {
        &self.recipients
    }

    fn fan_out(&self) -> FanOut {
        FanOut::Batched
    }

    #[instrument(skip(self, message), fields(count = recipients.len()))]
    async fn send(
        &self,
        recipients: &[String],
        subject: Option<&str>,
        message: &str,
    ) -> Result<(), DeliveryError> {
        let email = self.build_message(recipients, subject, message)?;

        match tokio::time::timeout(self.timeout, self.transport.send(email)).await {
            Ok(Ok(_)) => {
                info!("Email sent to {:?}", recipients);
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Email send failed");
                Err(DeliveryError::Transport(e.to_string()))
            }
            Err(_) => {
                error!(timeout = ?self.timeout, "Email send timed out");
                Err(DeliveryError::Timeout(self.timeout))
            }
        }
    }
}
