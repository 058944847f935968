#![allow(dead_code)]
//! Shared doubles and harnesses for the integration tests.

pub mod app;
pub mod mock_channel;
pub mod mock_log;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("alarmwatch=debug")
            .with_test_writer()
            .try_init();
    });
}
