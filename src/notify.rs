//! Notification surface - fire-and-forget operator alerts
//!
//! Sinks are a best-effort side channel: their completion is never awaited
//! and their failures never feed back into protocol state.

use crate::fleet::LogLevel;

/// Receives operator-facing notifications from the dispatcher.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, level: LogLevel, title: &str, message: &str);
}

/// Sink that writes notifications to the operational log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, level: LogLevel, title: &str, message: &str) {
        match level {
            LogLevel::Info => tracing::info!("{}: {}", title, message),
            LogLevel::Warning => tracing::warn!("{}: {}", title, message),
            LogLevel::Error => tracing::error!("{}: {}", title, message),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records notifications for assertions in dispatcher tests.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub notifications: Mutex<Vec<(LogLevel, String, String)>>,
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, level: LogLevel, title: &str, message: &str) {
            self.notifications
                .lock()
                .unwrap()
                .push((level, title.to_string(), message.to_string()));
        }
    }
}
