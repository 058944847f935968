//! Configuration management for AlarmWatch
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer built-in defaults, an `alarmwatch.toml` file,
//! `ALARMWATCH_` environment variables, and command-line arguments.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// The file read when no `--config` argument is given.
pub const DEFAULT_CONFIG_FILE: &str = "alarmwatch.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    pub rate_limit: RateLimitConfig,
    pub alarm_log: AlarmLogConfig,
    /// SMS gateway settings. The channel is disabled when absent.
    #[serde(default)]
    pub sms: Option<SmsConfig>,
    /// SMTP settings. The channel is disabled when absent.
    #[serde(default)]
    pub email: Option<EmailConfig>,
    pub delivery: DeliveryConfig,
    pub sensor: SensorConfig,
    pub metrics: MetricsConfig,
}

/// Configuration for the global alarm cooldown.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Minimum number of seconds between two admitted alarms.
    pub cooldown_seconds: u64,
}

/// Configuration for the append-only alarm log.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AlarmLogConfig {
    pub path: PathBuf,
}

/// Configuration for the SMS gateway channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SmsConfig {
    /// The gateway endpoint, e.g. `http://192.168.0.1/api/sms/send`.
    pub gateway_url: String,
    /// HTTP basic-auth user for the gateway.
    pub username: String,
    pub password: String,
    /// Phone numbers in E.164 format.
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Configuration for the email channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    /// Sender address; the SMTP username is used when unset.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl EmailConfig {
    /// The address used in the `From` header.
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

/// Configuration for the notification worker.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeliveryConfig {
    /// Upper bound on delivery attempts running at the same time.
    pub max_in_flight: usize,
}

/// Configuration for the simulated temperature sensor.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SensorConfig {
    pub enabled: bool,
    pub object_name: String,
    /// Seconds between two simulated samples.
    pub interval_seconds: u64,
    pub min_value: f64,
    pub max_value: f64,
    pub high_limit: f64,
    pub low_limit: f64,
    pub deadband: f64,
}

/// Configuration for the Prometheus metrics endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

fn default_timeout_seconds() -> u64 {
    crate::notification::DEFAULT_DELIVERY_TIMEOUT.as_secs()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_subject() -> String {
    crate::notification::email::DEFAULT_SUBJECT.to_string()
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Sources are merged in increasing order of precedence: defaults, the
    /// TOML file named by `--config` (or `alarmwatch.toml`), environment
    /// variables such as `ALARMWATCH_RATE_LIMIT__COOLDOWN_SECONDS=60`, and
    /// finally command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("ALARMWATCH_").split("__"))
            .merge(cli)
            .extract()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            rate_limit: RateLimitConfig {
                cooldown_seconds: crate::rate_limiter::DEFAULT_COOLDOWN.as_secs(),
            },
            alarm_log: AlarmLogConfig {
                path: PathBuf::from("alarm_log.csv"),
            },
            sms: None,
            email: None,
            delivery: DeliveryConfig { max_in_flight: 16 },
            sensor: SensorConfig {
                enabled: true,
                object_name: "TemperatureSensor1".to_string(),
                interval_seconds: 5,
                min_value: 20.0,
                max_value: 25.0,
                high_limit: 30.0,
                low_limit: 10.0,
                deadband: 0.5,
            },
            metrics: MetricsConfig {
                enabled: false,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
            },
        }
    }
}
