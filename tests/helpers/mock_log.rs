//! Alarm log doubles.

use alarmwatch::alarm_log::LogError;
use alarmwatch::core::{AlarmEvent, AlarmRecorder};
use std::io;
use std::sync::{Arc, Mutex};

/// Keeps every appended event in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryAlarmLog {
    pub events: Arc<Mutex<Vec<AlarmEvent>>>,
}

impl MemoryAlarmLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }
}

impl AlarmRecorder for MemoryAlarmLog {
    fn append(&self, event: &AlarmEvent) -> Result<(), LogError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A log whose storage is gone; every append fails.
#[derive(Clone, Debug, Default)]
pub struct FailingAlarmLog;

impl AlarmRecorder for FailingAlarmLog {
    fn append(&self, _event: &AlarmEvent) -> Result<(), LogError> {
        Err(LogError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "alarm log is read-only",
        )))
    }
}
