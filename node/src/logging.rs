//! # Structured Logging
//!
//! What the node logs, by target:
//!
//! | Target                          | Events                                            |
//! |---------------------------------|---------------------------------------------------|
//! | `afritrade_ledger::identity`    | registrations, logins, rejected logins, expiries  |
//! | `afritrade_ledger::transfer`    | verifications, commits, replays, PIN failures     |
//! | `afritrade_ledger::vault`       | wallet creation, deposits, balance updates        |
//! | `afritrade_ledger::chat`        | stored replies, upstream completion failures      |
//! | `afritrade_node`                | startup, listeners, session sweeps, shutdown      |
//! | `tower_http::trace`             | one span per HTTP request                         |
//!
//! Transfer events sit inside a span carrying `sender`, `recipient` and
//! `amount`, and commits add `tx_id`, so JSON output can be filtered on a
//! wallet without parsing messages.
//! Secrets never appear: PINs, passwords and tokens have redacting `Debug`
//! impls. Output goes to stderr so `version` can write to stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ledger and node events at `info`, request spans from `tower_http`.
/// `RUST_LOG` replaces this entirely.
pub const DEFAULT_FILTER: &str = "afritrade_node=info,afritrade_ledger=info,tower_http=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored, with source locations. For a terminal.
    Pretty,
    /// One object per line with the current span attached, for the log
    /// shipper in front of the node.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" in any case. Anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber. Must run before the ledger opens so the
/// `ledger opened` event is captured.
///
/// To trace a stuck transfer without the request noise:
///
/// ```text
/// RUST_LOG=afritrade_ledger::transfer=debug,afritrade_ledger::vault=debug afritrade-node run
/// ```
pub fn init_logging(default_filter: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_current_span(true),
                )
                .init();
        }
    }

    tracing::info!(?format, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lenient() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy(" json "), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("xml"), LogFormat::Pretty);
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
