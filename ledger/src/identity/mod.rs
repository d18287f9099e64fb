//! # Identity Module
//!
//! Who users are and how they prove it.
//!
//! The ledger core only needs two things from identity: a display name to
//! show on the verify step and in transaction records, and a yes/no answer
//! to "is this the sender's PIN". Those two questions form the
//! [`IdentityProvider`] trait. [`UserDirectory`] is the embedded
//! implementation; it also handles registration and bearer-token login.
//!
//! ```text
//! user.rs      : UserId, User, Profile, registration input
//! secret.rs    : Argon2 secret hashes, PINs, access tokens
//! directory.rs : The sled-backed user directory
//! ```

pub mod directory;
pub mod secret;
pub mod user;

pub use directory::UserDirectory;
pub use secret::{AccessToken, Pin, SecretHash};
pub use user::{normalize_email, NewUser, Profile, User, UserId};

use crate::error::LedgerResult;

/// What the transfer engine asks of the identity layer.
pub trait IdentityProvider: Send + Sync {
    /// Name shown to people paying this user.
    fn display_name(&self, user: UserId) -> LedgerResult<String>;

    /// Whether `pin` matches the user's stored PIN. A mismatch is
    /// `Ok(false)`; errors are reserved for lookups that fail.
    fn verify_pin(&self, user: UserId, pin: &Pin) -> LedgerResult<bool>;
}
