//! AlarmWatch - alarm notification dispatch for a simulated field device.

use alarmwatch::{app::App, cli::Cli, config::Config, core::AlarmEvent};
use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level when it is set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("AlarmWatch starting up...");
    log_config(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;

    if let Some(addr) = app.metrics_addr() {
        info!("Metrics server listening on http://{}/metrics", addr);
    }

    if let Some(message) = cli.test_alarm {
        info!("Injecting test alarm: {}", message);
        app.alarm_sender()
            .send(AlarmEvent::new(Some(Utc::now()), message))
            .await?;
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received. Shutting down gracefully..."),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    app.run().await?;
    info!("AlarmWatch shut down.");
    Ok(())
}

fn log_config(config: &Config) {
    let enabled = |on: bool| if on { "Enabled" } else { "Disabled" };

    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Alarm Log: {}", config.alarm_log.path.display());
    info!("Cooldown: {}s", config.rate_limit.cooldown_seconds);
    match &config.sms {
        Some(sms) => info!(
            "SMS: {} ({} recipients, timeout {}s)",
            sms.gateway_url,
            sms.recipients.len(),
            sms.timeout_seconds
        ),
        None => info!("SMS: Disabled"),
    }
    match &config.email {
        Some(email) => info!(
            "Email: {}:{} ({} recipients, timeout {}s)",
            email.smtp_host,
            email.smtp_port,
            email.recipients.len(),
            email.timeout_seconds
        ),
        None => info!("Email: Disabled"),
    }
    info!("Max In-Flight Deliveries: {}", config.delivery.max_in_flight);
    info!(
        "Sensor Simulator: {} ({}, every {}s)",
        enabled(config.sensor.enabled),
        config.sensor.object_name,
        config.sensor.interval_seconds
    );
    info!(
        "Metrics: {} ({})",
        enabled(config.metrics.enabled),
        config.metrics.listen_address
    );
    info!("-------------------------------------------------------");
}
