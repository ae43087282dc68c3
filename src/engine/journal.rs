//! Cycle journal: every orchestrator log line goes both to `tracing` and to
//! the persistent log sink, tagged with the cycle id.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::storage::LogSink;
use crate::types::{LogEntry, LogLevel};

/// Log categories written by the orchestrator.
pub mod category {
    pub const SCHEDULER: &str = "SCHEDULER";
    pub const AI: &str = "AI";
    pub const STRATEGY: &str = "STRATEGY";
    pub const RETENTION: &str = "RETENTION";
}

pub struct CycleLogger<'a> {
    sink: &'a dyn LogSink,
    cycle_id: String,
}

impl<'a> CycleLogger<'a> {
    pub fn new(sink: &'a dyn LogSink, cycle_id: impl Into<String>) -> Self {
        Self {
            sink,
            cycle_id: cycle_id.into(),
        }
    }

    pub fn cycle_id(&self) -> &str {
        &self.cycle_id
    }

    /// Emit one line. A sink failure is reported through `tracing` only.
    pub async fn log(&self, level: LogLevel, category: &str, message: &str, context: Value) {
        let context = self.with_cycle_id(context);
        match level {
            LogLevel::Debug => debug!(category, context = %context, "{message}"),
            LogLevel::Info => info!(category, context = %context, "{message}"),
            LogLevel::Warning => warn!(category, context = %context, "{message}"),
            LogLevel::Error | LogLevel::Critical => {
                error!(category, level = %level, context = %context, "{message}")
            }
        }

        let entry = LogEntry {
            level,
            category: category.to_string(),
            message: message.to_string(),
            context,
            created_at: Utc::now(),
        };
        if let Err(e) = self.sink.append(&entry).await {
            warn!(error = %e, category, "Failed to persist log entry");
        }
    }

    pub async fn info(&self, category: &str, message: &str, context: Value) {
        self.log(LogLevel::Info, category, message, context).await
    }

    pub async fn warning(&self, category: &str, message: &str, context: Value) {
        self.log(LogLevel::Warning, category, message, context).await
    }

    pub async fn error(&self, category: &str, message: &str, context: Value) {
        self.log(LogLevel::Error, category, message, context).await
    }

    fn with_cycle_id(&self, context: Value) -> Value {
        match context {
            Value::Object(mut map) => {
                map.insert("cycle_id".into(), Value::String(self.cycle_id.clone()));
                Value::Object(map)
            }
            Value::Null => json!({ "cycle_id": self.cycle_id }),
            other => json!({ "cycle_id": self.cycle_id, "detail": other }),
        }
    }
}
