//! Log forwarding into the pipeline tool's console.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// One redacted tracing event, flattened for the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Emitting module, e.g. `core_sync::coordinator`.
    pub target: String,
    pub message: String,
    /// Structured fields such as `shot` or `entity`, in key order.
    pub fields: BTreeMap<String, String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Single console line: `[Kitsu] WARN Shot skipped (shot=SQ01-SH010)`.
    pub fn console_line(&self) -> String {
        let mut line = format!("[Kitsu] {} {}", self.level.as_str(), self.message);
        if !self.fields.is_empty() {
            let fields = self
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            line.push_str(&format!(" ({})", fields));
        }
        line
    }
}

/// Receives log entries for the host application's console.
///
/// Entries arrive already redacted; implementations only route them.
#[async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Sink that prints console lines to stdout, for running outside a host.
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

#[async_trait]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level >= self.min_level {
            println!("{}", entry.console_line());
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_line() {
        let entry = LogEntry::new(LogLevel::Warn, "core_sync", "Shot skipped")
            .with_field("shot", "SQ01-SH010")
            .with_field("reason", "bad name");
        assert_eq!(
            entry.console_line(),
            "[Kitsu] WARN Shot skipped (reason=bad name shot=SQ01-SH010)"
        );
        assert!(entry.level > LogLevel::Info);
    }

    #[test]
    fn test_console_line_without_fields() {
        let entry = LogEntry::new(LogLevel::Info, "core_auth", "Logged in");
        assert_eq!(entry.console_line(), "[Kitsu] INFO Logged in");
    }

    #[tokio::test]
    async fn test_console_logger_filters_below_min_level() {
        let logger = ConsoleLogger {
            min_level: LogLevel::Error,
        };
        let entry = LogEntry::new(LogLevel::Debug, "test", "ignored");
        assert!(logger.log(entry).await.is_ok());
    }
}
