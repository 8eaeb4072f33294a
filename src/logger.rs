//! Minimal stderr backend for the `log` facade.
//!
//! Level precedence: command-line flags, then `TAPETTY_LOG`, then `warn`.

use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;

pub const LOG_ENV: &str = "TAPETTY_LOG";

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:<5}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Parse a level name as accepted by `TAPETTY_LOG`.
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    value.trim().parse().ok()
}

/// Resolve the effective level. `flag` comes from `-v`/`-q` and wins.
pub fn resolve_level(flag: Option<LevelFilter>) -> LevelFilter {
    flag.or_else(|| std::env::var(LOG_ENV).ok().as_deref().and_then(parse_level))
        .unwrap_or(LevelFilter::Warn)
}

/// Install the logger. Calling it twice keeps the first installation.
pub fn init(level: LevelFilter) {
    if log::set_boxed_logger(Box::new(StderrLogger { level })).is_ok() {
        log::set_max_level(level);
    }
}
