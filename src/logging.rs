//! # Logging Verbosity Control
//!
//! A small stdout logger plus a five-step verbosity dial. The dial maps to
//! `log::LevelFilter`, so any installed `log` backend honors it; the bundled
//! `StdoutLogger` is for hosts that have none.

use std::io::Write;

use log::{LevelFilter, Log, Metadata, Record};

/// Logging verbosity, from silent to debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    None,
    Error,
    Warning,
    Info,
    Debug,
}

impl Verbosity {
    pub fn to_filter(self) -> LevelFilter {
        match self {
            Verbosity::None => LevelFilter::Off,
            Verbosity::Error => LevelFilter::Error,
            Verbosity::Warning => LevelFilter::Warn,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }
}

/// Line-per-record logger writing to stdout.
#[derive(Debug)]
pub struct StdoutLogger;

static LOGGER: StdoutLogger = StdoutLogger;

impl Log for StdoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(
                std::io::stdout(),
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Installs the stdout logger (once per process; later calls only adjust
/// the level) and sets the verbosity.
pub fn init(verbosity: Verbosity) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(verbosity.to_filter());
}

/// Adjusts verbosity at runtime without touching the installed logger.
pub fn set_verbosity(verbosity: Verbosity) {
    log::set_max_level(verbosity.to_filter());
}
