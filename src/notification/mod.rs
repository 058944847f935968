//! Delivery of alarm notifications to people.
//!
//! The dispatcher turns each admitted alarm into `NotificationTask`s and
//! enqueues them. The `DeliveryWorker` runs every task as an independent
//! unit of concurrency and publishes a `DeliveryReport` for it, so a slow or
//! failing channel never holds up its siblings or the dispatcher.

pub mod email;
pub mod logging_subscriber;
pub mod sms;
pub mod worker;

use std::time::Duration;
use thiserror::Error;

pub use email::EmailChannel;
pub use sms::SmsChannel;
pub use worker::DeliveryWorker;

/// Default bound on a single delivery attempt.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// A failed delivery attempt on one channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Message(String),
}
