//! # Internal Metrics Module
//!
//! Counters and histograms for the alarm pipeline, recorded through the
//! `metrics` facade.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder and binds the
//!   listener for the metrics server when metrics are enabled.
//!
//! - **`Metrics`**: a cloneable handle with high-level methods for the
//!   pipeline's predefined metrics.
//!
//! - **`MetricsServer`**: (Defined in `server.rs`) an `axum` server exposing
//!   `/metrics` for Prometheus to scrape.

use crate::config::MetricsConfig;
use crate::core::DeliveryReport;
use crate::internal_metrics::server::MetricsServer;
use metrics::{Counter, Histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

pub mod server;

/// The public API for the metrics system.
#[derive(Clone)]
pub struct Metrics {
    pub alarms_received_total: Counter,
    pub alarms_suppressed_total: Counter,
    pub alarms_malformed_total: Counter,
    pub alarm_log_failures_total: Counter,
    pub delivery_duration_seconds: Histogram,
    enabled: bool,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!(
            "alarms_received_total",
            Unit::Count,
            "Total number of alarm events received by the dispatcher."
        );
        metrics::describe_counter!(
            "alarms_suppressed_total",
            Unit::Count,
            "Total number of alarms suppressed by the cooldown."
        );
        metrics::describe_counter!(
            "alarms_malformed_total",
            Unit::Count,
            "Total number of alarms rejected for missing message content."
        );
        metrics::describe_counter!(
            "alarm_log_failures_total",
            Unit::Count,
            "Total number of alarms that could not be written to the alarm log."
        );
        metrics::describe_counter!(
            "notifications_sent_total",
            Unit::Count,
            "Total number of successful delivery attempts, labeled by channel."
        );
        metrics::describe_counter!(
            "notifications_failed_total",
            Unit::Count,
            "Total number of failed delivery attempts, labeled by channel."
        );
        metrics::describe_histogram!(
            "delivery_duration_seconds",
            Unit::Seconds,
            "Duration of each delivery attempt."
        );

        Self {
            alarms_received_total: metrics::counter!("alarms_received_total"),
            alarms_suppressed_total: metrics::counter!("alarms_suppressed_total"),
            alarms_malformed_total: metrics::counter!("alarms_malformed_total"),
            alarm_log_failures_total: metrics::counter!("alarm_log_failures_total"),
            delivery_duration_seconds: metrics::histogram!("delivery_duration_seconds"),
            enabled: true,
        }
    }

    /// Creates a `Metrics` instance that performs no operations.
    pub fn disabled() -> Self {
        Self {
            alarms_received_total: Counter::noop(),
            alarms_suppressed_total: Counter::noop(),
            alarms_malformed_total: Counter::noop(),
            alarm_log_failures_total: Counter::noop(),
            delivery_duration_seconds: Histogram::noop(),
            enabled: false,
        }
    }

    /// Records the outcome of one delivery attempt.
    pub fn record_delivery(&self, report: &DeliveryReport) {
        if !self.enabled {
            return;
        }
        self.delivery_duration_seconds.record(report.elapsed);
        let name = if report.is_success() {
            "notifications_sent_total"
        } else {
            "notifications_failed_total"
        };
        metrics::counter!(name, "channel" => report.channel.clone()).increment(1);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    /// Creates a new `MetricsBuilder` with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system and returns a `Metrics` handle and an
    /// optional `MetricsServer`.
    ///
    /// Failure to set up the exporter is logged and degrades to disabled
    /// metrics; it never stops the alarm pipeline.
    pub fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::disabled(), None);
        }

        let builder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        ) {
            Ok(builder) => builder,
            Err(e) => {
                error!("Failed to configure Prometheus buckets: {}", e);
                return (Metrics::disabled(), None);
            }
        };
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        let listener = match bind_listener(self.config.listen_address) {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return (Metrics::disabled(), None);
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return (Metrics::disabled(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return (Metrics::disabled(), None);
        }

        let server = MetricsServer::new(listener, handle, shutdown_rx);
        (Metrics::new(), Some((server, addr)))
    }
}

fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = std::net::TcpListener::bind(addr)?;
    // Tokio requires a non-blocking socket.
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
}
