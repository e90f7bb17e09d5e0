// THEORY:
// The engine never reaches for a process-wide logger on its own. Every session is
// handed a `SessionLogger`, a cheap cloneable handle over any `log::Log`
// implementation plus the target string its records are tagged with. Hosts that
// already installed a logger (env_logger in the tester binary) pass
// `SessionLogger::global`; tests pass `SessionLogger::silent` or a capturing sink.

use std::fmt;
use std::sync::Arc;

use log::{Level, Log, Metadata, Record};

#[derive(Clone)]
pub struct SessionLogger {
    sink: Arc<dyn Log>,
    target: Arc<str>,
}

/// Forwards to whatever logger is installed through the `log` facade.
struct GlobalSink;

impl Log for GlobalSink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record)
    }

    fn flush(&self) {
        log::logger().flush()
    }
}

struct SilentSink;

impl Log for SilentSink {
    fn enabled(&self, _: &Metadata) -> bool {
        false
    }

    fn log(&self, _: &Record) {}

    fn flush(&self) {}
}

impl SessionLogger {
    pub fn new(sink: Arc<dyn Log>, target: impl Into<Arc<str>>) -> Self {
        Self {
            sink,
            target: target.into(),
        }
    }

    pub fn global(target: impl Into<Arc<str>>) -> Self {
        Self::new(Arc::new(GlobalSink), target)
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(SilentSink), "stego_lens")
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(&self.target).build();
        if !self.sink.enabled(&metadata) {
            return;
        }
        self.sink.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args)
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args)
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args)
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args)
    }
}

impl fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLogger")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Default for SessionLogger {
    fn default() -> Self {
        Self::global("stego_lens")
    }
}

/// In-memory sink for asserting on what a session logged.
#[cfg(test)]
pub(crate) mod capture {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct CaptureSink {
        pub records: Mutex<Vec<(Level, String, String)>>,
    }

    impl CaptureSink {
        pub fn messages(&self, level: Level) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|(recorded, _, _)| *recorded == level)
                .map(|(_, _, message)| message.clone())
                .collect()
        }
    }

    impl Log for CaptureSink {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.records.lock().unwrap().push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::capture::CaptureSink;
    use super::*;

    #[test]
    fn records_carry_the_session_target() {
        let sink = Arc::new(CaptureSink::default());
        let logger = SessionLogger::new(sink.clone(), "session-7");
        logger.info(format_args!("loaded {}x{}", 4, 3));
        logger.warn(format_args!("skipped"));

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], (Level::Info, "session-7".to_string(), "loaded 4x3".to_string()));
        assert_eq!(records[1].0, Level::Warn);
    }

    #[test]
    fn silent_logger_discards_everything() {
        let logger = SessionLogger::silent();
        logger.error(format_args!("nobody hears this"));
        assert_eq!(logger.target(), "stego_lens");
    }
}
