//! # Secrets: Passwords, PINs, Access Tokens
//!
//! Nothing secret is stored in the clear:
//!
//! - Passwords and PINs are stored as Argon2id PHC strings. Verification
//!   goes through the `argon2` crate, which compares in constant time.
//! - Access tokens are random 32-byte values handed to the client in hex.
//!   The server keeps only a BLAKE3 digest, so a copy of the database does
//!   not yield working tokens.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{ACCESS_TOKEN_BYTES, PIN_LENGTH};
use crate::error::{LedgerError, LedgerResult};

/// Domain tag for access-token digests.
const TOKEN_CONTEXT: &str = "afritrade 2026 access token v1";

// ---------------------------------------------------------------------------
// Password hashes
// ---------------------------------------------------------------------------

/// An Argon2id hash of a secret in PHC string form (salt and parameters
/// included).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretHash(String);

impl SecretHash {
    /// Hash `secret` under a fresh random salt.
    pub fn derive(secret: &str) -> LedgerResult<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| LedgerError::Hashing(e.to_string()))?;
        Ok(Self(hash.to_string()))
    }

    /// Whether `candidate` is the secret this hash was made from.
    ///
    /// A stored value that no longer parses verifies nothing.
    pub fn verify(&self, candidate: &str) -> bool {
        match PasswordHash::new(&self.0) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHash(..)")
    }
}

// ---------------------------------------------------------------------------
// PIN
// ---------------------------------------------------------------------------

/// A four-digit transfer PIN.
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    pub fn parse(input: &str) -> LedgerResult<Self> {
        let pin = input.trim();
        if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::Validation(format!(
                "PIN must be exactly {PIN_LENGTH} digits"
            )));
        }
        Ok(Self(pin.to_string()))
    }

    /// The digits, for hashing.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(****)")
    }
}

// ---------------------------------------------------------------------------
// Access tokens
// ---------------------------------------------------------------------------

/// A bearer token issued at login.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn generate() -> Self {
        let bytes: [u8; ACCESS_TOKEN_BYTES] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    /// The token string to hand to the client.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Storage key for this token.
    pub fn digest(&self) -> [u8; 32] {
        Self::digest_of(&self.0)
    }

    /// Storage key for a token presented by a client.
    pub fn digest_of(raw: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key(TOKEN_CONTEXT);
        hasher.update(raw.trim().as_bytes());
        *hasher.finalize().as_bytes()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_hash_verifies_only_the_original() {
        let hash = SecretHash::derive("correct horse").unwrap();
        assert!(hash.verify("correct horse"));
        assert!(!hash.verify("correct horse "));
        assert!(!hash.verify("Correct horse"));
        assert!(!hash.verify(""));
    }

    #[test]
    fn stored_hash_is_argon2id_and_hides_the_secret() {
        let hash = SecretHash::derive("pa55word").unwrap();
        assert!(hash.0.starts_with("$argon2id$"));
        assert!(!hash.0.contains("pa55word"));
    }

    #[test]
    fn same_secret_gets_different_salts() {
        let a = SecretHash::derive("1234").unwrap();
        let b = SecretHash::derive("1234").unwrap();
        assert_ne!(a, b);
        assert!(a.verify("1234") && b.verify("1234"));
    }

    #[test]
    fn corrupt_stored_hash_verifies_nothing() {
        let hash = SecretHash("not a phc string".into());
        assert!(!hash.verify("not a phc string"));
        assert!(!hash.verify(""));
    }

    #[test]
    fn pin_must_be_four_digits() {
        assert_eq!(Pin::parse("0042").unwrap().expose(), "0042");
        assert!(Pin::parse("123").is_err());
        assert!(Pin::parse("12345").is_err());
        assert!(Pin::parse("12a4").is_err());
        assert!(Pin::parse("١٢٣٤").is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let pin = Pin::parse("1234").unwrap();
        let token = AccessToken::generate();
        assert!(!format!("{pin:?}").contains("1234"));
        assert!(!format!("{token:?}").contains(token.expose()));
    }

    #[test]
    fn tokens_are_random_hex() {
        let a = AccessToken::generate();
        let b = AccessToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.expose().len(), ACCESS_TOKEN_BYTES * 2);
        assert!(hex::decode(a.expose()).is_ok());
        assert_eq!(a.digest(), AccessToken::digest_of(a.expose()));
        assert_ne!(a.digest(), b.digest());
    }
}
