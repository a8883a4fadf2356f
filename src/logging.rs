//! Structured logging (SPEC_FULL §10.2): a small `Logger` initializer over
//! `tracing` + `tracing-subscriber`. Reads `LOG_LEVEL`, falling back to
//! `TRACE` in debug builds and `INFO` in release; installs a compact `fmt`
//! layer with file/line stripped in release builds.

use tracing::metadata::LevelFilter;
use tracing_subscriber::{prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, Layer};

pub struct Logger;

impl Logger {
    /// Install the global tracing subscriber. `override_level` takes
    /// precedence over `LOG_LEVEL` when present (the `--log-level` CLI flag,
    /// spec §10.3).
    pub fn init(override_level: Option<&str>) {
        let level = override_level
            .map(str::to_string)
            .or_else(|| std::env::var("LOG_LEVEL").ok())
            .map_or_else(Self::default_level, |raw| parse_level(&raw));

        tracing_subscriber::Registry::default()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(cfg!(debug_assertions))
                    .with_line_number(cfg!(debug_assertions))
                    .compact()
                    .with_filter(level),
            )
            .init();
    }

    fn default_level() -> LevelFilter {
        if cfg!(debug_assertions) {
            LevelFilter::TRACE
        } else {
            LevelFilter::INFO
        }
    }
}

fn parse_level(raw: &str) -> LevelFilter {
    match raw.to_ascii_lowercase().as_str() {
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => Logger::default_level(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_recognises_known_values() {
        assert_eq!(parse_level("warn"), LevelFilter::WARN);
        assert_eq!(parse_level("TRACE"), LevelFilter::TRACE);
    }

    #[test]
    fn parse_level_falls_back_on_unknown_values() {
        assert_eq!(parse_level("bogus"), Logger::default_level());
    }
}
