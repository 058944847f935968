//! The main application logic, decoupled from the entry point.

use crate::{
    alarm_log::CsvAlarmLog,
    config::Config,
    core::{AlarmEvent, AlarmRecorder, DeliveryReport, NotificationChannel},
    dispatcher::{DispatchOutcome, Dispatcher},
    internal_metrics::{Metrics, MetricsBuilder},
    notification::{email::DEFAULT_SUBJECT, logging_subscriber, DeliveryWorker},
    rate_limiter::RateLimiter,
    sensor::SensorSimulator,
    services::build_channels,
    task_manager::TaskManager,
    types::{AlarmSender, ReportSender},
};
use anyhow::{Context, Result};
use async_channel::Receiver;
use std::{
    net::SocketAddr,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, instrument};

const REPORT_CHANNEL_CAPACITY: usize = 256;

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    alarm_tx: AlarmSender,
    report_tx: ReportSender,
    dispatcher: Arc<Dispatcher>,
    metrics_addr: Option<SocketAddr>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The intake the field-protocol stack submits alarms to.
    pub fn alarm_sender(&self) -> AlarmSender {
        self.alarm_tx.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Subscribes to the outcome of every delivery attempt from now on.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DeliveryReport> {
        self.report_tx.subscribe()
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        shutdown_rx.wait_for(|stop| *stop).await.ok();
        info!("Shutdown signal received. Waiting for tasks to complete...");

        // The delivery logger exits once the worker releases the last sender.
        drop(self.report_tx);
        drop(self.alarm_tx);
        let panicked = self.task_manager.shutdown().await;
        if panicked > 0 {
            error!("{} tasks did not shut down cleanly.", panicked);
        }

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Components that talk to the outside world can be overridden so tests
/// can run the full pipeline against local doubles.
pub struct AppBuilder {
    config: Config,
    channels_override: Option<Vec<Arc<dyn NotificationChannel>>>,
    alarm_log_override: Option<Arc<dyn AlarmRecorder>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            channels_override: None,
            alarm_log_override: None,
            metrics_override: None,
        }
    }

    /// Overrides the notification channels for testing.
    pub fn channels_override(mut self, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        self.channels_override = Some(channels);
        self
    }

    /// Overrides the alarm log for testing.
    pub fn alarm_log_override(mut self, alarm_log: Arc<dyn AlarmRecorder>) -> Self {
        self.alarm_log_override = Some(alarm_log);
        self
    }

    /// Overrides the metrics system for testing.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Builds and initializes all application components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);

        // =========================================================================
        // 1. Initialize Metrics
        // =========================================================================
        let (metrics, metrics_server_info) = match self.metrics_override {
            Some(m) => (m, None),
            None => {
                MetricsBuilder::new(config.metrics.clone()).build(task_manager.get_shutdown_rx())
            }
        };
        let metrics = Arc::new(metrics);

        let metrics_addr = if let Some((server, addr)) = metrics_server_info {
            task_manager.spawn("MetricsServer", server.run());
            Some(addr)
        } else {
            None
        };

        // =========================================================================
        // 2. Instantiate Services
        // =========================================================================
        let alarm_log: Arc<dyn AlarmRecorder> = match self.alarm_log_override {
            Some(log) => log,
            None => {
                let path = &config.alarm_log.path;
                let log = CsvAlarmLog::open(path)
                    .with_context(|| format!("Failed to open alarm log at {}", path.display()))?;
                Arc::new(log)
            }
        };

        let cooldown = Duration::from_secs(config.rate_limit.cooldown_seconds);
        debug!(?cooldown, "Initializing rate limiter");
        let rate_limiter = Arc::new(RateLimiter::new(cooldown));

        let channels = match self.channels_override {
            Some(channels) => channels,
            None => build_channels(&config)?,
        };

        // =========================================================================
        // 3. Delivery Side: queue, worker and diagnostics sink
        // =========================================================================
        let (task_tx, task_rx) = async_channel::unbounded();
        let (report_tx, report_rx) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        logging_subscriber::spawn(&task_manager, report_rx);

        let worker = DeliveryWorker::new(
            task_rx,
            config.delivery.max_in_flight,
            report_tx.clone(),
            metrics.clone(),
        );
        task_manager.spawn("DeliveryWorker", worker.run(task_manager.get_shutdown_rx()));

        // =========================================================================
        // 4. Dispatcher and Alarm Intake
        // =========================================================================
        let subject = config
            .email
            .as_ref()
            .map(|email| email.subject.clone())
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
        let dispatcher = Arc::new(
            Dispatcher::new(alarm_log, rate_limiter, channels, task_tx, metrics.clone())
                .with_subject(subject),
        );

        let (alarm_tx, alarm_rx) = async_channel::unbounded();
        task_manager.spawn(
            "AlarmIntake",
            alarm_intake_loop(task_manager.get_shutdown_rx(), alarm_rx, dispatcher.clone()),
        );

        // =========================================================================
        // 5. Optional Sensor Simulator
        // =========================================================================
        if config.sensor.enabled {
            let simulator = SensorSimulator::new(config.sensor.clone(), alarm_tx.clone());
            task_manager.spawn("SensorSimulator", simulator.run(task_manager.get_shutdown_rx()));
        }

        info!(
            cooldown_seconds = config.rate_limit.cooldown_seconds,
            "Alarm notification pipeline initialized. Waiting for alarms..."
        );

        Ok(App {
            task_manager,
            alarm_tx,
            report_tx,
            dispatcher,
            metrics_addr,
        })
    }
}

/// Feeds every submitted alarm through the dispatcher.
///
/// A panic while handling one alarm is logged and the loop keeps going, so a
/// single bad event cannot stop later alarms from being handled. Alarms still
/// queued when shutdown arrives are handled before the loop returns, so each
/// accepted alarm reaches the alarm log.
async fn alarm_intake_loop(
    mut shutdown_rx: watch::Receiver<bool>,
    alarm_rx: Receiver<AlarmEvent>,
    dispatcher: Arc<Dispatcher>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                info!("Alarm intake received shutdown signal.");
                break;
            }
            result = alarm_rx.recv() => match result {
                Ok(event) => handle_alarm(&dispatcher, event),
                Err(_) => {
                    info!("Alarm intake closed.");
                    break;
                }
            }
        }
    }

    let mut drained = 0;
    while let Ok(event) = alarm_rx.try_recv() {
        handle_alarm(&dispatcher, event);
        drained += 1;
    }
    if drained > 0 {
        info!(drained, "Handled alarms queued at shutdown.");
    }
    info!("Alarm intake finished.");
}

fn handle_alarm(dispatcher: &Dispatcher, event: AlarmEvent) {
    match catch_unwind(AssertUnwindSafe(|| dispatcher.on_alarm(event))) {
        Ok(DispatchOutcome::Dispatched { tasks }) => debug!(tasks, "Alarm dispatched."),
        Ok(outcome) => debug!(?outcome, "Alarm not dispatched."),
        Err(_) => error!("Alarm handling panicked; continuing with the next alarm."),
    }
}
