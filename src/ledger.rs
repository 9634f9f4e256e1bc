use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub url: String,
    pub message: String,
}

/// Append-only failure list shared by all download workers. Entries are read
/// back once, after the workers have finished.
#[derive(Debug, Default)]
pub struct FailureLedger {
    records: Mutex<Vec<FailureRecord>>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, url: &str, message: impl Into<String>) {
        let record = FailureRecord {
            url: url.to_string(),
            message: message.into(),
        };
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    pub fn into_records(self) -> Vec<FailureRecord> {
        self.records
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
