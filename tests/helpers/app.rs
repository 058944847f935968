//! Test helpers for running the full application instance.

use alarmwatch::{
    app::App,
    config::Config,
    core::{AlarmEvent, AlarmRecorder, DeliveryReport, NotificationChannel},
    dispatcher::Dispatcher,
    internal_metrics::Metrics,
};
use anyhow::Result;
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::timeout,
};

/// A running application wired to test doubles.
pub struct TestApp {
    pub alarm_tx: async_channel::Sender<AlarmEvent>,
    pub dispatcher: Arc<Dispatcher>,
    pub reports: broadcast::Receiver<DeliveryReport>,
    pub metrics_addr: Option<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    app_handle: Option<JoinHandle<Result<()>>>,
}

impl TestApp {
    /// Submits an alarm through the intake, as the protocol stack would.
    pub async fn raise(&self, message: &str) -> Result<()> {
        self.alarm_tx
            .send(AlarmEvent::new(Some(Utc::now()), message))
            .await?;
        Ok(())
    }

    /// Collects `count` delivery reports, failing if they do not arrive in time.
    pub async fn next_reports(
        &mut self,
        count: usize,
        within: Duration,
    ) -> Result<Vec<DeliveryReport>> {
        let mut reports = Vec::with_capacity(count);
        let deadline = tokio::time::Instant::now() + within;
        while reports.len() < count {
            match tokio::time::timeout_at(deadline, self.reports.recv()).await {
                Ok(report) => reports.push(report?),
                Err(_) => anyhow::bail!("only {} of {} reports arrived", reports.len(), count),
            }
        }
        Ok(reports)
    }

    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(mut self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send(true)?;

        if let Some(handle) = self.app_handle.take() {
            match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            }
        } else {
            Ok(())
        }
    }
}

/// A builder for creating `TestApp` instances with specific configurations.
pub struct TestAppBuilder {
    pub config: Config,
    channels: Vec<Arc<dyn NotificationChannel>>,
    alarm_log: Option<Arc<dyn AlarmRecorder>>,
    real_metrics: bool,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        // No simulated alarms and no exporter unless a test asks for them.
        config.sensor.enabled = false;
        config.metrics.enabled = false;
        config.sms = None;
        config.email = None;

        Self {
            config,
            channels: Vec::new(),
            alarm_log: None,
            real_metrics: false,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.rate_limit.cooldown_seconds = cooldown.as_secs();
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_alarm_log(mut self, alarm_log: Arc<dyn AlarmRecorder>) -> Self {
        self.alarm_log = Some(alarm_log);
        self
    }

    /// Installs the Prometheus recorder and serves `/metrics` on an ephemeral
    /// port. The recorder is process-global, so only one app per test binary
    /// may do this.
    pub fn with_metrics_server(mut self) -> Self {
        self.config.metrics.enabled = true;
        self.config.metrics.listen_address = SocketAddr::from(([127, 0, 0, 1], 0));
        self.real_metrics = true;
        self
    }

    pub fn with_config<F: FnOnce(&mut Config)>(mut self, f: F) -> Self {
        f(&mut self.config);
        self
    }

    /// Builds the application and starts it in the background.
    pub async fn start(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut builder = App::builder(self.config).channels_override(self.channels);
        if !self.real_metrics {
            builder = builder.metrics_override(Metrics::disabled());
        }
        if let Some(alarm_log) = self.alarm_log {
            builder = builder.alarm_log_override(alarm_log);
        }
        let app = builder.build(shutdown_rx).await?;

        let alarm_tx = app.alarm_sender();
        let dispatcher = app.dispatcher();
        let reports = app.subscribe_reports();
        let metrics_addr = app.metrics_addr();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            alarm_tx,
            dispatcher,
            reports,
            metrics_addr,
            shutdown_tx,
            app_handle: Some(app_handle),
        })
    }
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
