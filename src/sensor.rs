//! A simulated temperature sensor with high/low limit alarming.
//!
//! The simulator is only a producer: it feeds `AlarmEvent`s into the same
//! intake channel the field-protocol stack would use.

use crate::config::SensorConfig;
use crate::core::AlarmEvent;
use async_channel::Sender;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Which side of the limits the monitored value is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitState {
    Normal,
    High,
    Low,
}

/// Tracks a value against high and low limits with a return-to-normal
/// deadband.
#[derive(Debug, Clone)]
pub struct LimitMonitor {
    high_limit: f64,
    low_limit: f64,
    deadband: f64,
    state: LimitState,
}

impl LimitMonitor {
    pub fn new(high_limit: f64, low_limit: f64, deadband: f64) -> Self {
        Self {
            high_limit,
            low_limit,
            deadband: deadband.abs(),
            state: LimitState::Normal,
        }
    }

    pub fn state(&self) -> LimitState {
        self.state
    }

    /// Feeds one sample and returns the new state if it changed.
    ///
    /// Entering `High` or `Low` happens as soon as a limit is crossed; going
    /// back to `Normal` requires the value to be inside the limit by more
    /// than the deadband.
    pub fn evaluate(&mut self, value: f64) -> Option<LimitState> {
        let next = if value > self.high_limit {
            LimitState::High
        } else if value < self.low_limit {
            LimitState::Low
        } else {
            match self.state {
                LimitState::High if value >= self.high_limit - self.deadband => LimitState::High,
                LimitState::Low if value <= self.low_limit + self.deadband => LimitState::Low,
                _ => LimitState::Normal,
            }
        };

        if next == self.state {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

/// Periodically updates a simulated present value and raises limit alarms.
pub struct SensorSimulator {
    config: SensorConfig,
    monitor: LimitMonitor,
    alarm_tx: Sender<AlarmEvent>,
}

impl SensorSimulator {
    pub fn new(config: SensorConfig, alarm_tx: Sender<AlarmEvent>) -> Self {
        let monitor = LimitMonitor::new(config.high_limit, config.low_limit, config.deadband);
        Self {
            config,
            monitor,
            alarm_tx,
        }
    }

    /// Evaluates one sample and builds the alarm it raises, if any.
    pub fn process_sample(&mut self, value: f64, at: DateTime<Utc>) -> Option<AlarmEvent> {
        let name = &self.config.object_name;
        match self.monitor.evaluate(value)? {
            LimitState::High => Some(AlarmEvent::new(
                Some(at),
                format!("{name} high limit alarm: {value:.2}"),
            )),
            LimitState::Low => Some(AlarmEvent::new(
                Some(at),
                format!("{name} low limit alarm: {value:.2}"),
            )),
            LimitState::Normal => {
                info!(object = %name, value, "Sensor returned to normal");
                None
            }
        }
    }

    /// Draws the next simulated value, rounded to two decimals.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let (low, high) = if self.config.min_value <= self.config.max_value {
            (self.config.min_value, self.config.max_value)
        } else {
            (self.config.max_value, self.config.min_value)
        };
        let value = rng.random_range(low..=high);
        (value * 100.0).round() / 100.0
    }

    /// Runs the simulation loop until shutdown.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.interval_seconds.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(object = %self.config.object_name, ?period, "Sensor simulator started.");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Sensor simulator received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {
                    let value = self.sample(&mut rand::rng());
                    debug!(
                        object = %self.config.object_name,
                        value,
                        "Updated Temperature: {} °C",
                        value
                    );
                    if let Some(event) = self.process_sample(value, Utc::now()) {
                        warn!(message = %event.message, "Sensor limit exceeded");
                        if self.alarm_tx.send(event).await.is_err() {
                            info!("Alarm intake closed. Sensor simulator shutting down.");
                            break;
                        }
                    }
                }
            }
        }
    }
}
