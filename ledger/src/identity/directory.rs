//! # User Directory
//!
//! Embedded user accounts: registration, login, bearer-token lookup, and the
//! [`IdentityProvider`] the transfer engine checks PINs against.
//!
//! Registration writes the user, the email index, the wallet, and the
//! wallet-owner index in one sled transaction. There is no moment at which a
//! user exists without a wallet.
//!
//! Access tokens expire `access_token_ttl` after they are issued. An expired
//! row is deleted the first time it is presented, and
//! [`UserDirectory::purge_expired_sessions`] sweeps the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::secret::{AccessToken, Pin};
use super::user::{normalize_email, NewUser, User, UserId};
use super::IdentityProvider;
use crate::error::{LedgerError, LedgerResult, StagedResult};
use crate::storage::db::{decode, encode};
use crate::storage::{DbError, LedgerDb};
use crate::vault::{Wallet, WalletStore};

/// Value of a `sessions` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    user: UserId,
    expires_at: DateTime<Utc>,
}

impl SessionRecord {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// `now + ttl`, saturating at the end of representable time.
fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// User accounts backed by the ledger database.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    db: LedgerDb,
    wallets: WalletStore,
}

impl UserDirectory {
    pub fn new(db: LedgerDb, wallets: WalletStore) -> Self {
        Self { db, wallets }
    }

    /// Create a user and their wallet together.
    pub fn register(&self, new_user: NewUser) -> LedgerResult<(User, Wallet)> {
        let validated = new_user.validate()?;
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email: validated.email,
            full_name: validated.full_name,
            password: validated.password,
            pin: validated.pin,
            profile: new_user.profile,
            created_at: now,
        };
        let encoded = encode(&user)?;

        let wallet = (
            &self.db.users,
            &self.db.user_emails,
            &self.db.wallets,
            &self.db.wallet_owners,
        )
            .transaction(|(users, emails, wallets, owners)| -> StagedResult<Wallet> {
                if emails.get(user.email.as_bytes())?.is_some() {
                    return sled::transaction::abort(LedgerError::AlreadyExists(format!(
                        "user with email {}",
                        user.email
                    )));
                }
                users.insert(user.id.as_key(), encoded.clone())?;
                emails.insert(user.email.as_bytes(), user.id.as_key())?;
                self.wallets.stage_new_wallet(wallets, owners, user.id, now)
            })?;
        self.wallets.maybe_flush()?;

        info!(user = %user.id, wallet = %wallet.number, "user registered");
        Ok((user, wallet))
    }

    /// Check credentials and issue a new access token.
    ///
    /// Unknown email and wrong password fail the same way.
    pub fn login(&self, email: &str, password: &str) -> LedgerResult<AccessToken> {
        let email = normalize_email(email).map_err(|_| LedgerError::InvalidCredentials)?;
        let Some(raw_id) = self.db.user_emails.get(email.as_bytes())? else {
            return Err(LedgerError::InvalidCredentials);
        };
        let id = UserId::from_key(&raw_id)
            .ok_or_else(|| DbError::Serialization("corrupt email index entry".into()))?;
        let user = self.user(id)?;
        if !user.password.verify(password) {
            warn!(user = %id, "login rejected");
            return Err(LedgerError::InvalidCredentials);
        }

        let token = self.issue_token_at(id, Utc::now())?;
        info!(user = %id, "login");
        Ok(token)
    }

    /// Issue a token without a password check. Used right after
    /// registration.
    pub fn issue_token(&self, user: UserId) -> LedgerResult<AccessToken> {
        self.issue_token_at(user, Utc::now())
    }

    pub(crate) fn issue_token_at(
        &self,
        user: UserId,
        now: DateTime<Utc>,
    ) -> LedgerResult<AccessToken> {
        let token = AccessToken::generate();
        let record = SessionRecord {
            user,
            expires_at: expiry(now, self.wallets.config().access_token_ttl),
        };
        self.db.sessions.insert(token.digest(), encode(&record)?)?;
        Ok(token)
    }

    /// Resolve a bearer token to its user.
    ///
    /// Unknown and expired tokens fail the same way.
    pub fn authenticate(&self, token: &str) -> LedgerResult<UserId> {
        self.authenticate_at(token, Utc::now())
    }

    pub(crate) fn authenticate_at(&self, token: &str, now: DateTime<Utc>) -> LedgerResult<UserId> {
        let key = AccessToken::digest_of(token);
        let Some(raw) = self.db.sessions.get(key)? else {
            return Err(LedgerError::InvalidCredentials);
        };
        match decode::<SessionRecord>(&raw) {
            Ok(record) if record.is_live(now) => Ok(record.user),
            Ok(record) => {
                self.db.sessions.remove(key)?;
                debug!(user = %record.user, "expired access token removed");
                Err(LedgerError::InvalidCredentials)
            }
            Err(e) => {
                self.db.sessions.remove(key)?;
                warn!(error = %e, "unreadable session row removed");
                Err(LedgerError::InvalidCredentials)
            }
        }
    }

    /// Delete every session row that has expired. Returns how many went.
    pub fn purge_expired_sessions(&self) -> LedgerResult<usize> {
        self.purge_expired_sessions_at(Utc::now())
    }

    pub(crate) fn purge_expired_sessions_at(&self, now: DateTime<Utc>) -> LedgerResult<usize> {
        let mut removed = 0;
        for entry in self.db.sessions.iter() {
            let (key, raw) = entry?;
            let live = decode::<SessionRecord>(&raw).is_ok_and(|record| record.is_live(now));
            if !live {
                self.db.sessions.remove(key)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "expired sessions purged");
        }
        Ok(removed)
    }

    /// Look up a user by id.
    pub fn user(&self, id: UserId) -> LedgerResult<User> {
        match self.db.users.get(id.as_key())? {
            Some(raw) => Ok(decode(&raw)?),
            None => Err(LedgerError::UserNotFound(id)),
        }
    }
}

impl IdentityProvider for UserDirectory {
    fn display_name(&self, user: UserId) -> LedgerResult<String> {
        Ok(self.user(user)?.full_name)
    }

    fn verify_pin(&self, user: UserId, pin: &Pin) -> LedgerResult<bool> {
        Ok(self.user(user)?.pin.verify(pin.expose()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::identity::Profile;
    use crate::vault::Amount;

    fn directory() -> UserDirectory {
        let db = LedgerDb::open_temporary().unwrap();
        let config = LedgerConfig {
            flush_on_commit: false,
            ..LedgerConfig::default()
        };
        let wallets = WalletStore::new(db.clone(), config);
        UserDirectory::new(db, wallets)
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            full_name: "Ama Mensah".into(),
            password: "pa55word".into(),
            confirm_password: "pa55word".into(),
            pin: "1234".into(),
            profile: Profile::default(),
        }
    }

    #[test]
    fn register_creates_user_and_empty_wallet() {
        let dir = directory();
        let (user, wallet) = dir.register(new_user("ama@example.com")).unwrap();

        assert_eq!(wallet.owner, user.id);
        assert_eq!(wallet.balance, Amount::ZERO);
        assert_eq!(dir.user(user.id).unwrap(), user);
        assert_eq!(dir.wallets.get_wallet(user.id).unwrap(), wallet);
    }

    #[test]
    fn duplicate_email_is_rejected_without_side_effects() {
        let dir = directory();
        dir.register(new_user("ama@example.com")).unwrap();
        let err = dir.register(new_user("ama@EXAMPLE.com")).unwrap_err();

        assert!(matches!(err, LedgerError::AlreadyExists(_)));
        assert_eq!(dir.db.user_count(), 1);
        assert_eq!(dir.db.wallet_count(), 1);
    }

    #[test]
    fn login_and_authenticate() {
        let dir = directory();
        let (user, _) = dir.register(new_user("ama@example.com")).unwrap();

        let token = dir.login("ama@Example.com", "pa55word").unwrap();
        assert_eq!(dir.authenticate(token.expose()).unwrap(), user.id);

        let issued = dir.issue_token(user.id).unwrap();
        assert_eq!(dir.authenticate(issued.expose()).unwrap(), user.id);
    }

    #[test]
    fn bad_credentials_are_uniform() {
        let dir = directory();
        dir.register(new_user("ama@example.com")).unwrap();

        for (email, password) in [
            ("ama@example.com", "wrong"),
            ("nobody@example.com", "pa55word"),
            ("not-an-email", "pa55word"),
        ] {
            assert!(matches!(
                dir.login(email, password),
                Err(LedgerError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            dir.authenticate("deadbeef"),
            Err(LedgerError::InvalidCredentials)
        ));
    }

    #[test]
    fn expired_token_is_refused_and_removed() {
        let dir = directory();
        let (user, _) = dir.register(new_user("ama@example.com")).unwrap();
        let ttl = dir.wallets.config().access_token_ttl;
        let issued_at = Utc::now();
        let token = dir.issue_token_at(user.id, issued_at).unwrap();

        let just_before = issued_at + chrono::Duration::from_std(ttl).unwrap()
            - chrono::Duration::seconds(1);
        assert_eq!(dir.authenticate_at(token.expose(), just_before).unwrap(), user.id);

        let after = issued_at + chrono::Duration::from_std(ttl).unwrap();
        assert!(matches!(
            dir.authenticate_at(token.expose(), after),
            Err(LedgerError::InvalidCredentials)
        ));
        assert!(dir.db.sessions.is_empty());
        // Gone for good, even if the clock were wound back.
        assert!(matches!(
            dir.authenticate_at(token.expose(), issued_at),
            Err(LedgerError::InvalidCredentials)
        ));
    }

    #[test]
    fn zero_ttl_tokens_never_authenticate() {
        let db = LedgerDb::open_temporary().unwrap();
        let config = LedgerConfig {
            flush_on_commit: false,
            access_token_ttl: Duration::ZERO,
            ..LedgerConfig::default()
        };
        let dir = UserDirectory::new(db.clone(), WalletStore::new(db, config));
        dir.register(new_user("ama@example.com")).unwrap();

        let token = dir.login("ama@example.com", "pa55word").unwrap();
        assert!(matches!(
            dir.authenticate(token.expose()),
            Err(LedgerError::InvalidCredentials)
        ));
    }

    #[test]
    fn purge_sweeps_only_expired_sessions() {
        let dir = directory();
        let (user, _) = dir.register(new_user("ama@example.com")).unwrap();
        let ttl = chrono::Duration::from_std(dir.wallets.config().access_token_ttl).unwrap();
        let now = Utc::now();

        let stale = dir.issue_token_at(user.id, now - ttl - chrono::Duration::minutes(1)).unwrap();
        let fresh = dir.issue_token_at(user.id, now).unwrap();
        dir.db.sessions.insert([0u8; 32], &[1u8, 2, 3][..]).unwrap();

        assert_eq!(dir.purge_expired_sessions_at(now).unwrap(), 2);
        assert_eq!(dir.db.sessions.len(), 1);
        assert_eq!(dir.authenticate_at(fresh.expose(), now).unwrap(), user.id);
        assert!(dir.authenticate_at(stale.expose(), now).is_err());
    }

    #[test]
    fn stored_password_is_not_the_plaintext() {
        let dir = directory();
        let (user, _) = dir.register(new_user("ama@example.com")).unwrap();
        let raw = dir.db.users.get(user.id.as_key()).unwrap().unwrap();
        assert!(!raw.windows(8).any(|w| w == b"pa55word"));
        assert!(user.password.verify("pa55word"));
        assert!(!user.password.verify("pa55word!"));
    }

    #[test]
    fn pin_gate_uses_stored_hash() {
        let dir = directory();
        let (user, _) = dir.register(new_user("ama@example.com")).unwrap();

        assert!(dir.verify_pin(user.id, &Pin::parse("1234").unwrap()).unwrap());
        assert!(!dir.verify_pin(user.id, &Pin::parse("4321").unwrap()).unwrap());
        assert_eq!(dir.display_name(user.id).unwrap(), "Ama Mensah");
        assert!(matches!(
            dir.display_name(UserId::new()),
            Err(LedgerError::UserNotFound(_))
        ));
    }

    #[test]
    fn wallet_creation_is_part_of_registration() {
        let dir = directory();
        let (user, _) = dir.register(new_user("ama@example.com")).unwrap();
        // A second wallet for the same user cannot be created afterwards.
        assert!(matches!(
            dir.wallets.create_wallet(user.id),
            Err(LedgerError::AlreadyExists(_))
        ));
    }
}
