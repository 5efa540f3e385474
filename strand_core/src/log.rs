//! Diagnostics sink.
//!
//! The engine reports transform decisions, unresolved dependencies, and
//! verification failures through a caller-supplied [`Log`]. [`Logger`] wraps
//! the sink with the session's verbosity filtering so call sites stay terse.

use std::fmt;
use std::sync::Arc;

// =============================================================================
// Levels and Sink
// =============================================================================

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Per-instruction detail, only with `debug` enabled.
    Debug,
    /// Per-class/per-method decisions, only with `verbose` enabled.
    Info,
    /// Suspicious but non-fatal conditions (e.g. still-unresolved entries).
    Warning,
    /// Per-class failures.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A structured log callback. Implemented by the driver, consumed by the
/// engine.
pub trait Log: Send + Sync {
    /// Receive one formatted message at the given severity.
    fn log(&self, level: LogLevel, message: &str);
}

/// A sink that discards everything.
#[derive(Debug, Default)]
pub struct NopLog;

impl Log for NopLog {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// A sink that writes `LEVEL: message` lines to stderr.
#[derive(Debug, Default)]
pub struct StderrLog;

impl Log for StderrLog {
    fn log(&self, level: LogLevel, message: &str) {
        eprintln!("[strand] {level}: {message}");
    }
}

// =============================================================================
// Logger
// =============================================================================

/// A shareable handle pairing a sink with the session's verbosity filter.
///
/// `Warning` and `Error` always pass; `Info` requires `verbose`; `Debug`
/// requires `debug`.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Log>,
    verbose: bool,
    debug: bool,
}

impl Logger {
    /// Create a logger over the given sink.
    pub fn new(sink: Arc<dyn Log>, verbose: bool, debug: bool) -> Self {
        Self {
            sink,
            verbose,
            debug,
        }
    }

    /// A logger that discards everything.
    pub fn nop() -> Self {
        Self::new(Arc::new(NopLog), false, false)
    }

    /// Emit a message, subject to the verbosity filter.
    pub fn log(&self, level: LogLevel, message: &str) {
        let pass = match level {
            LogLevel::Debug => self.debug,
            LogLevel::Info => self.verbose,
            LogLevel::Warning | LogLevel::Error => true,
        };
        if pass {
            self.sink.log(level, message);
        }
    }

    /// Whether `Debug` messages would be emitted. Lets callers skip building
    /// expensive dumps (disassembly) that would be discarded.
    #[inline]
    pub fn debug_enabled(&self) -> bool {
        self.debug
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("verbose", &self.verbose)
            .field("debug", &self.debug)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<(LogLevel, String)>>);

    impl Log for Capture {
        fn log(&self, level: LogLevel, message: &str) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_warnings_and_errors_always_pass() {
        let cap = Arc::new(Capture::default());
        let logger = Logger::new(cap.clone(), false, false);
        logger.log(LogLevel::Warning, "w");
        logger.log(LogLevel::Error, "e");
        assert_eq!(cap.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_info_requires_verbose() {
        let cap = Arc::new(Capture::default());
        Logger::new(cap.clone(), false, false).log(LogLevel::Info, "dropped");
        Logger::new(cap.clone(), true, false).log(LogLevel::Info, "kept");
        let lines = cap.0.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].1, "kept");
    }

    #[test]
    fn test_debug_requires_debug() {
        let cap = Arc::new(Capture::default());
        Logger::new(cap.clone(), true, false).log(LogLevel::Debug, "dropped");
        Logger::new(cap.clone(), true, true).log(LogLevel::Debug, "kept");
        assert_eq!(cap.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }
}
