//! Command-Line Interface (CLI) argument parsing.
//!
//! The arguments are parsed at startup with `clap` and merged over the
//! configuration file and environment variables, so a flag always wins.

use clap::Parser;
use figment::{
    util::nest,
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Virtual field device that relays alarms to SMS and email with a cooldown.
#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Minimum number of seconds between two notified alarms.
    #[arg(long, value_name = "SECONDS")]
    pub cooldown: Option<u64>,

    /// Path of the CSV alarm log.
    #[arg(long, value_name = "FILE")]
    pub alarm_log: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Inject one alarm with this message at startup.
    #[arg(long, value_name = "MESSAGE")]
    pub test_alarm: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        // Each section receives at most one flag, so extending with the
        // nested dictionaries never overwrites a sibling key.
        if let Some(cooldown) = self.cooldown {
            let nested = nest("rate_limit.cooldown_seconds", Value::from(cooldown));
            dict.extend(nested.into_dict().unwrap_or_default());
        }

        if let Some(path) = &self.alarm_log {
            let nested = nest("alarm_log.path", Value::from(path.display().to_string()));
            dict.extend(nested.into_dict().unwrap_or_default());
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
