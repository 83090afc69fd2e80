//! Process-wide logging state: the configured level filter, an optional
//! substring diagnostic filter, and the "alarm" pseudo-level that must
//! surface notifier activity even when the operator has turned everything
//! else down with `--log-level=error`.

use log::{LevelFilter, Log, Metadata, Record};
use simple_logger::SimpleLogger;

/// Target string alarm-channel log calls are tagged with. `Log::enabled`
/// special-cases this target so it is never suppressed by the level filter.
pub const ALARM_TARGET: &str = "tempest_bridge::alarm";

/// Emit a message on the out-of-band alarm sink. Bypasses `--log-level`.
#[macro_export]
macro_rules! alarm {
    ($($arg:tt)+) => {
        log::log!(target: $crate::log_control::ALARM_TARGET, log::Level::Info, $($arg)+)
    };
}

struct AlarmAwareLogger {
    inner: SimpleLogger,
    filter: Option<String>,
    level: LevelFilter,
}

impl Log for AlarmAwareLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target() == ALARM_TARGET || metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(needle) = &self.filter {
            let formatted = format!("{}", record.args());
            if !formatted.to_lowercase().contains(&needle.to_lowercase()) {
                return;
            }
        }
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the process-wide logger. Must be called exactly once, before any
/// other module logs. `filter` restricts emitted lines to those whose
/// formatted message contains the substring, case-insensitively.
///
/// The inner `SimpleLogger` is held open at `Trace` so it never re-applies
/// its own level filter; `AlarmAwareLogger` is the only place the
/// operator's `--log-level` is enforced, and it exempts `ALARM_TARGET`
/// records from that enforcement entirely. Delegating straight to a
/// level-filtered inner logger would silently drop alarm notifications
/// whenever `--log-level` was set above `Info`.
pub fn init(level: LevelFilter, filter: Option<String>) -> anyhow::Result<()> {
    let inner = SimpleLogger::new()
        .with_level(LevelFilter::Trace)
        .with_utc_timestamps();
    let logger = AlarmAwareLogger {
        inner,
        filter,
        level,
    };
    log::set_max_level(LevelFilter::Trace);
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| anyhow::anyhow!("logger already initialized: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_target_is_constant() {
        assert_eq!(ALARM_TARGET, "tempest_bridge::alarm");
    }

    #[test]
    fn alarm_target_bypasses_a_restrictive_level() {
        let logger = AlarmAwareLogger {
            inner: SimpleLogger::new().with_level(LevelFilter::Trace),
            filter: None,
            level: LevelFilter::Error,
        };
        let alarm_meta = Metadata::builder()
            .target(ALARM_TARGET)
            .level(log::Level::Info)
            .build();
        let other_meta = Metadata::builder()
            .target("tempest_bridge::source")
            .level(log::Level::Info)
            .build();
        assert!(logger.enabled(&alarm_meta));
        assert!(!logger.enabled(&other_meta));
    }
}
