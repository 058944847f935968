//! AlarmWatch - alarm notification dispatch for a simulated field device.
//!
//! Alarms raised by the device are appended to a CSV log, passed through a
//! global cooldown and fanned out to SMS and email recipients without ever
//! blocking the context that raised them.

pub mod alarm_log;
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod internal_metrics;
pub mod notification;
pub mod rate_limiter;
pub mod sensor;
pub mod services;
pub mod task_manager;
pub mod types;

// Re-export core types for convenience
pub use core::*;
