//! Common type aliases used throughout the application.

use crate::core::{AlarmEvent, DeliveryReport};
use tokio::sync::broadcast;

/// Where the protocol stack (or the simulator) submits alarms.
pub type AlarmSender = async_channel::Sender<AlarmEvent>;
pub type ReportSender = broadcast::Sender<DeliveryReport>;
