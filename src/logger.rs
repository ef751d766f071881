/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Injectable logging plug-point (§6).
//!
//! Drivers hold an `Arc<dyn Logger>` rather than calling `tracing` macros
//! directly so a host application can route verbose/debug output wherever
//! it likes (a TUI status line, a file, ...). The default implementation
//! simply forwards to `tracing`, so a process that never injects anything
//! still gets sensible output once it installs a subscriber.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
}

/// A minimal plug-point with a single formatted-print capability.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }
}

/// Default [`Logger`] that delegates to the host's standard `tracing`
/// subscriber (§4.4, §6).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
        }
    }
}

pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingLogger(Mutex<Vec<(LogLevel, String)>>);

    impl Logger for RecordingLogger {
        fn log(&self, level: LogLevel, message: &str) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn records_every_level() {
        let logger = RecordingLogger::default();
        logger.trace("t");
        logger.debug("d");
        logger.info("i");
        logger.warn("w");
        let entries = logger.0.lock().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[2], (LogLevel::Info, "i".to_string()));
    }
}
