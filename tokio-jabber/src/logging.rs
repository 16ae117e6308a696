// Copyright (c) 2026 jabber-simple contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-connection log forwarding.
//!
//! Every line the transport and the negotiation emit goes to the [`log`]
//! facade. A [`Logger`] carrying a [`LogSink`] additionally hands a copy of
//! each line to the embedding application, e.g. to surface it in its own
//! debug output.

use core::fmt;
use std::sync::Arc;

use log::Level;

/// Receives a copy of every line logged for one connection.
pub type LogSink = Arc<dyn Fn(Level, &str) + Send + Sync>;

/// Logs through the [`log`] facade and into an optional [`LogSink`].
#[derive(Clone, Default)]
pub struct Logger {
    sink: Option<LogSink>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Logger {
    /// A logger which also forwards to `sink`.
    pub fn new(sink: LogSink) -> Logger {
        Logger { sink: Some(sink) }
    }

    /// Whether lines are forwarded anywhere besides the log facade.
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Emit one line. Prefer the [`log_to!`](crate::log_to) macro, which
    /// fills in the target.
    pub fn log(&self, level: Level, target: &str, args: fmt::Arguments<'_>) {
        log::log!(target: target, level, "{}", args);
        if let Some(sink) = &self.sink {
            sink(level, &args.to_string());
        }
    }
}

/// Log a line through a [`Logger`], with the calling module as target.
///
/// ```
/// use tokio_jabber::{log_to, logging::Logger};
///
/// let logger = Logger::default();
/// log_to!(logger, log::Level::Debug, "Connecting to {}", "example.org");
/// ```
#[macro_export]
macro_rules! log_to {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log($level, module_path!(), format_args!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_sink_receives_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let logger = Logger::new(Arc::new(move |level, line: &str| {
            sink_lines.lock().unwrap().push((level, line.to_owned()));
        }));
        assert!(logger.has_sink());
        log_to!(logger, Level::Debug, "Bound to {}", "bot@example.org/res");
        log_to!(logger.clone(), Level::Trace, "SEND: {}", "<presence/>");
        assert_eq!(
            *lines.lock().unwrap(),
            vec![
                (Level::Debug, String::from("Bound to bot@example.org/res")),
                (Level::Trace, String::from("SEND: <presence/>")),
            ]
        );
    }

    #[test]
    fn test_default_has_no_sink() {
        let logger = Logger::default();
        assert!(!logger.has_sink());
        log_to!(logger, Level::Info, "nobody listens");
    }
}
