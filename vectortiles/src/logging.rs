//! Logging initialization using `tracing` and `tracing-subscriber`.
//!
//! The filter comes from `RUST_LOG`, the output format from `VECTORTILES_LOG_FORMAT`.

use std::str::FromStr;

use tracing::Level;
use tracing::dispatcher::{Dispatch, SetGlobalDefaultError};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Environment variable selecting the [`LogFormat`].
pub const LOG_FORMAT_ENV: &str = "VECTORTILES_LOG_FORMAT";

/// Log output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, single-line logs.
    Full,
    /// A variant of the full format, optimized for short line lengths.
    Compact,
    /// Compact, without timestamps, targets or ANSI colors.
    Bare,
    /// Multi-line logs for local debugging.
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

impl LogFormat {
    fn dispatch(self, env_filter: EnvFilter) -> Dispatch {
        match self {
            Self::Full => tracing_subscriber::fmt()
                .with_span_events(FmtSpan::NONE)
                .with_env_filter(env_filter)
                .finish()
                .into(),
            Self::Compact => tracing_subscriber::fmt()
                .compact()
                .with_span_events(FmtSpan::NONE)
                .with_env_filter(env_filter)
                .finish()
                .into(),
            Self::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(env_filter)
                .finish()
                .into(),
            Self::Bare => tracing_subscriber::fmt()
                .compact()
                .with_span_events(FmtSpan::NONE)
                .without_time()
                .with_target(false)
                .with_ansi(false)
                .with_env_filter(env_filter)
                .finish()
                .into(),
            Self::Json => tracing_subscriber::fmt()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_env_filter(env_filter)
                .finish()
                .into(),
        }
    }

    /// Install this format as the global subscriber.
    ///
    /// `SubscriberInitExt::init()` is avoided because it would install its own `LogTracer`.
    pub fn init(self, env_filter: EnvFilter) -> Result<(), SetGlobalDefaultError> {
        tracing::dispatcher::set_global_default(self.dispatch(env_filter))
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Compact
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "compact" => Ok(Self::Compact),
            "pretty" | "verbose" => Ok(Self::Pretty),
            "bare" => Ok(Self::Bare),
            "json" | "jsonl" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid log format '{s}'. Valid options: json, full, compact, bare or pretty"
            )),
        }
    }
}

fn log_level(level: Level) -> log::LevelFilter {
    match level {
        Level::TRACE => log::LevelFilter::Trace,
        Level::DEBUG => log::LevelFilter::Debug,
        Level::INFO => log::LevelFilter::Info,
        Level::WARN => log::LevelFilter::Warn,
        Level::ERROR => log::LevelFilter::Error,
    }
}

/// Forward `log` records of dependencies into `tracing`.
fn init_log_bridge(env_filter: &EnvFilter) -> Result<(), log::SetLoggerError> {
    let mut log_builder = tracing_log::LogTracer::builder()
        .with_interest_cache(tracing_log::InterestCacheConfig::default());
    if let Some(Some(max_level)) = env_filter.max_level_hint().map(LevelFilter::into_level) {
        log_builder = log_builder.with_max_level(log_level(max_level));
    }
    log_builder.init()
}

/// Initialize the global tracing subscriber for the given filter and format.
///
/// Problems are reported on stderr, the program keeps running without logs.
pub fn init_tracing(filter: &str, format: Option<String>) {
    let env_filter = EnvFilter::from_str(filter).unwrap_or_else(|_| {
        eprintln!("Warning: Invalid filter string '{filter}' passed, using 'debug' instead");
        EnvFilter::new("debug")
    });

    let log_format = format
        .and_then(|s| {
            s.parse::<LogFormat>()
                .map_err(|e| {
                    eprintln!("Warning: {e}");
                    eprintln!("Falling back to default format ({:?})", LogFormat::default());
                })
                .ok()
        })
        .unwrap_or_default();

    if let Err(e) = init_log_bridge(&env_filter) {
        eprintln!("Unable to forward log records to tracing: {e}");
    }
    if let Err(e) = log_format.init(env_filter) {
        eprintln!("Unable to initialize logging: {e}");
    }
}

/// Mirror the `vectortiles=` level of `RUST_LOG` onto the library crate.
#[must_use]
pub fn ensure_core_log_level_matches(env_filter: Option<String>) -> String {
    const APP: &str = "vectortiles=";
    const CORE: &str = "vectortiles_core=";
    let Some(rust_log) = env_filter else {
        return format!("{APP}info,{CORE}info");
    };
    if rust_log.contains(CORE) {
        return rust_log;
    }
    match rust_log.split(',').find_map(|s| s.strip_prefix(APP)) {
        Some(level) => format!("{rust_log},{CORE}{level}"),
        None => rust_log,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("full", LogFormat::Full)]
    #[case("COMPACT", LogFormat::Compact)]
    #[case("verbose", LogFormat::Pretty)]
    #[case("bare", LogFormat::Bare)]
    #[case("jsonl", LogFormat::Json)]
    fn test_parse_format(#[case] value: &str, #[case] expected: LogFormat) {
        assert_eq!(value.parse::<LogFormat>(), Ok(expected));
    }

    #[test]
    fn test_bad_format() {
        assert!("xml".parse::<LogFormat>().unwrap_err().contains("xml"));
    }

    #[rstest]
    #[case(None, "vectortiles=info,vectortiles_core=info")]
    #[case(Some("debug"), "debug")]
    #[case(Some("vectortiles=trace"), "vectortiles=trace,vectortiles_core=trace")]
    #[case(
        Some("warn,vectortiles=debug,vectortiles_core=info"),
        "warn,vectortiles=debug,vectortiles_core=info"
    )]
    fn test_core_log_level(#[case] rust_log: Option<&str>, #[case] expected: &str) {
        assert_eq!(
            ensure_core_log_level_matches(rust_log.map(ToString::to_string)),
            expected
        );
    }
}
