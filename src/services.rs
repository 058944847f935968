//! Encapsulation for setting up external notification services.

use crate::{
    config::Config,
    core::NotificationChannel,
    notification::{EmailChannel, SmsChannel},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the notification channels enabled in the configuration.
///
/// A section that is present but names no recipients (or no endpoint) is
/// skipped with a warning. A recipient that cannot be parsed fails startup.
pub fn build_channels(config: &Config) -> Result<Vec<Arc<dyn NotificationChannel>>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    if let Some(sms) = &config.sms {
        if sms.gateway_url.is_empty() {
            warn!(
                "SMS notifications are configured, but no gateway URL was provided. \
                 SMS notifications will be disabled."
            );
        } else if sms.recipients.is_empty() {
            warn!(
                "SMS notifications are configured without recipients. \
                 SMS notifications will be disabled."
            );
        } else {
            info!(recipients = sms.recipients.len(), "SMS notification channel enabled.");
            channels.push(Arc::new(SmsChannel::new(sms)?));
        }
    }

    if let Some(email) = &config.email {
        if email.smtp_host.is_empty() {
            warn!(
                "Email notifications are configured, but no SMTP host was provided. \
                 Email notifications will be disabled."
            );
        } else if email.recipients.is_empty() {
            warn!(
                "Email notifications are configured without recipients. \
                 Email notifications will be disabled."
            );
        } else {
            info!(recipients = email.recipients.len(), "Email notification channel enabled.");
            channels.push(Arc::new(EmailChannel::new(email)?));
        }
    }

    if channels.is_empty() {
        warn!("No notification channels are enabled; alarms will only be logged.");
    }
    Ok(channels)
}
