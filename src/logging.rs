//! Dependency-injected logging.
//!
//! The source system reaches a process-wide logging singleton from any
//! layer. Design Note §9 calls for explicit injection instead: the
//! storage core is handed a `&dyn Logger` at construction and never
//! touches global state itself. `FacadeLogger` is the one implementation
//! that *does* reach a global — the `log` crate's own macros — but that
//! global lives in the host application's chosen logging backend
//! (`env_logger`, `fern`, ...), not in this crate.

/// Severity ordering matches `log::Level` so `FacadeLogger` is a direct
/// pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub trait Logger: Send + Sync {
    fn log(&self, level: Level, target: &str, message: &str);

    fn error(&self, target: &str, message: &str) {
        self.log(Level::Error, target, message)
    }
    fn warn(&self, target: &str, message: &str) {
        self.log(Level::Warn, target, message)
    }
    fn info(&self, target: &str, message: &str) {
        self.log(Level::Info, target, message)
    }
    fn debug(&self, target: &str, message: &str) {
        self.log(Level::Debug, target, message)
    }
    fn trace(&self, target: &str, message: &str) {
        self.log(Level::Trace, target, message)
    }
}

/// Discards everything. The zero-config default, and what tests use so
/// that test output stays quiet unless a test explicitly wants to inspect
/// log output.
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Level, _target: &str, _message: &str) {}
}

/// Forwards to the `log` crate's global macros, so a host process can wire
/// up `env_logger`/`fern`/etc. once, and every component constructed with
/// `FacadeLogger` reports through it.
pub struct FacadeLogger;

impl Logger for FacadeLogger {
    fn log(&self, level: Level, target: &str, message: &str) {
        let level = match level {
            Level::Error => log::Level::Error,
            Level::Warn => log::Level::Warn,
            Level::Info => log::Level::Info,
            Level::Debug => log::Level::Debug,
            Level::Trace => log::Level::Trace,
        };
        log::log!(target: "relastore", level, "[{}] {}", target, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recording(std::sync::Mutex<Vec<(Level, String, String)>>);

    impl Logger for Recording {
        fn log(&self, level: Level, target: &str, message: &str) {
            self.0
                .lock()
                .unwrap()
                .push((level, target.to_string(), message.to_string()));
        }
    }

    #[test]
    fn default_methods_forward_to_log() {
        let r = Recording(std::sync::Mutex::new(Vec::new()));
        r.warn("defrag", "out of memory, discarding partial output");
        let recorded = r.0.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, Level::Warn);
        assert_eq!(recorded[0].1, "defrag");
    }
}
