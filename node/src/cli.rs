//! # CLI Interface
//!
//! Command-line arguments for `afritrade-node`, defined with `clap` derive.
//! Every `run` flag also reads from an `AFRITRADE_*` environment variable so
//! the node can be configured entirely from container environment variables.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use afritrade_ledger::config::{
    ChatConfig, LedgerConfig, DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_COMPLETION_ENDPOINT,
    DEFAULT_COMPLETION_MODEL, DEFAULT_WALLET_NUMBER_ATTEMPTS,
};

use crate::logging::LogFormat;

/// AfriTrade wallet ledger node.
///
/// Serves registration, wallets, two-step transfers, transaction history,
/// and the trade advisor chat over HTTP, backed by an embedded sled ledger.
#[derive(Parser, Debug)]
#[command(
    name = "afritrade-node",
    about = "AfriTrade wallet ledger node",
    version,
    propagate_version = true
)]
pub struct AfriTradeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the ledger and serve the HTTP API.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the ledger database. Created on first run.
    #[arg(long, short = 'd', env = "AFRITRADE_DATA_DIR", default_value = "./afritrade-data")]
    pub data_dir: PathBuf,

    /// Address the API and metrics listeners bind to.
    #[arg(long, env = "AFRITRADE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the REST API.
    #[arg(long, env = "AFRITRADE_API_PORT", default_value_t = 8000)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "AFRITRADE_METRICS_PORT", default_value_t = 9100)]
    pub metrics_port: u16,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "AFRITRADE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// How long a transfer waits for a wallet lock before answering `busy`.
    #[arg(long, env = "AFRITRADE_LOCK_TIMEOUT_MS", default_value_t = 2_000)]
    pub lock_timeout_ms: u64,

    /// Random draws allowed when allocating a new wallet number.
    #[arg(long, env = "AFRITRADE_WALLET_NUMBER_ATTEMPTS", default_value_t = DEFAULT_WALLET_NUMBER_ATTEMPTS)]
    pub wallet_number_attempts: u32,

    /// Access token lifetime in seconds.
    #[arg(long, env = "AFRITRADE_ACCESS_TOKEN_TTL_SECS", default_value_t = DEFAULT_ACCESS_TOKEN_TTL.as_secs())]
    pub access_token_ttl_secs: u64,

    /// Skip the fsync after each balance change. Faster, less durable.
    #[arg(long, env = "AFRITRADE_NO_FLUSH")]
    pub no_flush: bool,

    /// OpenAI-compatible chat completion endpoint.
    #[arg(long, env = "AFRITRADE_COMPLETION_ENDPOINT", default_value = DEFAULT_COMPLETION_ENDPOINT)]
    pub completion_endpoint: String,

    /// Model name sent to the completion endpoint.
    #[arg(long, env = "AFRITRADE_COMPLETION_MODEL", default_value = DEFAULT_COMPLETION_MODEL)]
    pub completion_model: String,

    /// Bearer key for the completion endpoint.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub completion_api_key: Option<String>,

    /// Completion request timeout in seconds.
    #[arg(long, env = "AFRITRADE_COMPLETION_TIMEOUT_SECS", default_value_t = 30)]
    pub completion_timeout_secs: u64,
}

impl RunArgs {
    pub fn log_format(&self) -> LogFormat {
        LogFormat::from_str_lossy(&self.log_format)
    }

    /// Ledger tunables with CLI overrides applied.
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            wallet_number_attempts: self.wallet_number_attempts,
            flush_on_commit: !self.no_flush,
            access_token_ttl: Duration::from_secs(self.access_token_ttl_secs),
        }
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            endpoint: self.completion_endpoint.clone(),
            model: self.completion_model.clone(),
            api_key: self.completion_api_key.clone().unwrap_or_default(),
            timeout: Duration::from_secs(self.completion_timeout_secs),
            ..ChatConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        AfriTradeCli::command().debug_assert();
    }

    #[test]
    fn run_flags_override_ledger_defaults() {
        let cli = AfriTradeCli::try_parse_from([
            "afritrade-node",
            "run",
            "--data-dir",
            "/tmp/ledger",
            "--lock-timeout-ms",
            "250",
            "--no-flush",
            "--log-format",
            "json",
            "--access-token-ttl-secs",
            "900",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        let config = args.ledger_config();
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert!(!config.flush_on_commit);
        assert_eq!(config.wallet_number_attempts, DEFAULT_WALLET_NUMBER_ATTEMPTS);
        assert_eq!(config.access_token_ttl, Duration::from_secs(900));
        assert_eq!(args.log_format(), LogFormat::Json);
        assert_eq!(args.data_dir, PathBuf::from("/tmp/ledger"));
    }

    #[test]
    fn chat_config_keeps_the_advisor_prompt() {
        let cli = AfriTradeCli::try_parse_from([
            "afritrade-node",
            "run",
            "--completion-model",
            "test/model",
            "--completion-api-key",
            "sk-test",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        let chat = args.chat_config();
        assert_eq!(chat.model, "test/model");
        assert_eq!(chat.api_key, "sk-test");
        assert_eq!(chat.endpoint, DEFAULT_COMPLETION_ENDPOINT);
        assert_eq!(chat.system_prompt, ChatConfig::default().system_prompt);
    }
}
