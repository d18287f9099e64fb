//! User records and registration input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::secret::SecretHash;
use crate::config::MAX_FULL_NAME_CHARS;
use crate::error::{LedgerError, LedgerResult};

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Stable identifier of a user. Random, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// A fresh random id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Key bytes for user-keyed trees.
    pub fn as_key(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Rebuild from stored key bytes.
    pub fn from_key(bytes: &[u8]) -> Option<Self> {
        Uuid::from_slice(bytes).ok().map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| LedgerError::Validation(format!("invalid user id: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Optional profile details collected at sign-up. Stored, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub business_type: Option<String>,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub state_province: Option<String>,
    pub preferred_language: Option<String>,
    pub voice_mode: bool,
    pub enable_biometrics_login: bool,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Normalized email. Unique.
    pub email: String,

    /// Display name shown to people sending money to this user.
    pub full_name: String,

    pub password: SecretHash,
    pub pin: SecretHash,
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
}

/// Registration input, as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub confirm_password: String,
    pub pin: String,
    #[serde(flatten)]
    pub profile: Profile,
}

impl NewUser {
    /// Check the fields that do not need the database.
    pub(crate) fn validate(&self) -> LedgerResult<ValidatedUser> {
        let email = normalize_email(&self.email)?;

        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            return Err(LedgerError::Validation("full name is required".into()));
        }
        if full_name.chars().count() > MAX_FULL_NAME_CHARS {
            return Err(LedgerError::Validation(format!(
                "full name must be at most {MAX_FULL_NAME_CHARS} characters"
            )));
        }

        if self.password.is_empty() {
            return Err(LedgerError::Validation("password is required".into()));
        }
        if self.password != self.confirm_password {
            return Err(LedgerError::Validation("password fields didn't match".into()));
        }

        let pin = super::secret::Pin::parse(&self.pin)?;

        Ok(ValidatedUser {
            email,
            full_name: full_name.to_string(),
            password: SecretHash::derive(&self.password)?,
            pin: SecretHash::derive(pin.expose())?,
        })
    }
}

/// Registration fields after validation and hashing.
pub(crate) struct ValidatedUser {
    pub email: String,
    pub full_name: String,
    pub password: SecretHash,
    pub pin: SecretHash,
}

/// Trim, then lower-case the domain part. The local part is kept as typed.
pub fn normalize_email(input: &str) -> LedgerResult<String> {
    let email = input.trim();
    let invalid = || LedgerError::Validation(format!("'{email}' is not a valid email address"));

    let (local, domain) = email.rsplit_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(format!("{local}@{}", domain.to_lowercase()))
}
