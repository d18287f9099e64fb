//! # Ledger Configuration & Constants
//!
//! Every magic number in the ledger lives here. The field limits mirror the
//! ones the mobile client was built against, so changing them is a client
//! compatibility decision, not a refactor.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Number of decimal places carried by every amount and balance.
pub const AMOUNT_DECIMALS: u32 = 2;

/// Minor units per major unit (cents per unit).
pub const MINOR_UNITS_PER_MAJOR: u64 = 100;

/// Largest amount or balance the ledger will hold, in minor units.
///
/// Twelve significant digits with two decimals: 9,999,999,999.99.
pub const MAX_BALANCE_MINOR: u64 = 999_999_999_999;

// ---------------------------------------------------------------------------
// Wallet Numbers
// ---------------------------------------------------------------------------

/// Width of a wallet number in digits. Numbers are zero-padded.
pub const WALLET_NUMBER_DIGITS: usize = 6;

/// Largest wallet number (inclusive). The space is `0..=WALLET_NUMBER_MAX`.
pub const WALLET_NUMBER_MAX: u32 = 999_999;

/// How many draws we make before declaring the number space exhausted.
///
/// With a million numbers and uniform draws, hitting this cap means the
/// space is nearly full, not that we were unlucky.
pub const DEFAULT_WALLET_NUMBER_ATTEMPTS: u32 = 64;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Exact length of a transfer PIN. Digits only.
pub const PIN_LENGTH: usize = 4;

/// Access token length in bytes before hex encoding.
pub const ACCESS_TOKEN_BYTES: usize = 32;

/// How long an access token stays valid after it is issued.
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Field Limits
// ---------------------------------------------------------------------------

/// Maximum transfer description length, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 255;

/// Maximum display name length, in characters.
pub const MAX_FULL_NAME_CHARS: usize = 255;

/// Maximum chat prompt length, in characters.
pub const MAX_PROMPT_CHARS: usize = 2_000;

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

/// How long a commit waits for a wallet lock before reporting `Busy`.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Default chat-completion endpoint (OpenAI-compatible).
pub const DEFAULT_COMPLETION_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default completion model.
pub const DEFAULT_COMPLETION_MODEL: &str = "deepseek/deepseek-r1:free";

/// Upstream request timeout for chat completions.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// System prompt for the trade advisor.
pub const TRADE_ADVISOR_PROMPT: &str = "You are AfriTrade Advisor, a friendly, multilingual \
assistant that helps people across Africa understand and succeed in cross-border trade. \
Explain every step in clear, simple language: which documents are needed, where to get \
them, which agencies to contact, what each step costs and how long it takes, and which \
mistakes to avoid. When the user has not said which goods or which origin and destination \
countries are involved, ask for them before answering. Be patient, supportive and \
practical, and say so when your information may be out of date.";

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Tunables for the ledger core.
///
/// Defaults suit a single-node deployment. Tests usually shorten the lock
/// timeout and turn off per-commit flushing.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Upper bound on waiting for a wallet lock.
    pub lock_timeout: Duration,

    /// Draws allowed when allocating a wallet number.
    pub wallet_number_attempts: u32,

    /// Flush the database after every balance-changing commit.
    pub flush_on_commit: bool,

    /// Lifetime of an access token. Expired tokens are refused and removed.
    pub access_token_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            wallet_number_attempts: DEFAULT_WALLET_NUMBER_ATTEMPTS,
            flush_on_commit: true,
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
        }
    }
}

/// Settings for the upstream completion service.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Completion endpoint URL.
    pub endpoint: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Bearer key for the upstream service. Empty means unauthenticated.
    pub api_key: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Prompt prepended to every conversation.
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_COMPLETION_ENDPOINT.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            api_key: String::new(),
            timeout: DEFAULT_COMPLETION_TIMEOUT,
            system_prompt: TRADE_ADVISOR_PROMPT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_number_width_matches_max() {
        assert_eq!(WALLET_NUMBER_MAX.to_string().len(), WALLET_NUMBER_DIGITS);
    }

    #[test]
    fn max_balance_has_twelve_digits() {
        assert_eq!(MAX_BALANCE_MINOR.to_string().len(), 12);
        assert_eq!(MINOR_UNITS_PER_MAJOR, 10u64.pow(AMOUNT_DECIMALS));
    }

    #[test]
    fn default_config_is_durable() {
        let config = LedgerConfig::default();
        assert!(config.flush_on_commit);
        assert!(config.lock_timeout > Duration::ZERO);
        assert!(config.wallet_number_attempts > 0);
        assert!(config.access_token_ttl > Duration::ZERO);
    }
}
