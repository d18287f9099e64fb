//! # Transfer Engine
//!
//! Moves money between two wallets with a two-phase protocol:
//!
//! 1. **Verify**: resolve the recipient's wallet number to a display name
//!    so the sender can confirm who they are paying. Read-only, no PIN.
//! 2. **Transfer**: the sender re-submits everything with their PIN. The
//!    engine re-checks every precondition, then debits, credits, and writes
//!    the transaction record in a single sled transaction.
//!
//! No state is kept between the phases. A commit that loses a lock race
//! fails with a retryable `Busy`; a commit retried with the same
//! idempotency key returns the first result instead of paying twice.
//!
//! ## Commit Sequence
//!
//! ```text
//! PIN present? ─► PIN matches? ─► amount > 0 ─► replay? ─► balance ≥ amount
//!     ─► recipient exists ─► recipient ≠ sender ─► lock pair (ordered)
//!     ─► sled txn { re-read, debit, credit, record, index, idempotency }
//! ```

use chrono::Utc;
use sled::transaction::TransactionalTree;
use sled::Transactional;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::request::{IdempotencyKey, TransferReceipt, TransferRequest, Verification};
use crate::config::MAX_DESCRIPTION_CHARS;
use crate::error::{staged, LedgerError, LedgerResult, StagedResult};
use crate::identity::{IdentityProvider, Pin, UserId};
use crate::storage::db::decode;
use crate::storage::keys::{pair_key, uuid_from_bytes};
use crate::storage::{DbError, LedgerDb};
use crate::transaction::{Transaction, TransactionLog};
use crate::vault::store::{stage_read_wallet, stage_write_wallet};
use crate::vault::{Amount, BalanceDelta, Wallet, WalletNumber, WalletStore};

/// What the atomic commit produced.
enum Outcome {
    Committed(Transaction, Amount),
    Replayed(Transaction, Amount),
}

/// The two-phase transfer protocol over a shared wallet store.
#[derive(Clone)]
pub struct TransferEngine {
    db: LedgerDb,
    wallets: WalletStore,
    log: TransactionLog,
    identity: Arc<dyn IdentityProvider>,
}

impl TransferEngine {
    pub fn new(
        db: LedgerDb,
        wallets: WalletStore,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let log = TransactionLog::new(db.clone());
        Self {
            db,
            wallets,
            log,
            identity,
        }
    }

    // -----------------------------------------------------------------------
    // Phase 1
    // -----------------------------------------------------------------------

    /// Resolve the recipient and report their display name. Takes no lock
    /// and changes nothing, so it can be called any number of times.
    #[instrument(skip_all, fields(sender = %sender, recipient = %recipient))]
    pub fn verify(
        &self,
        sender: UserId,
        recipient: WalletNumber,
        amount: Amount,
    ) -> LedgerResult<Verification> {
        let amount = amount.ensure_positive()?;
        let wallet = self.resolve_recipient(recipient)?;
        let recipient_name = self.identity.display_name(wallet.owner)?;
        debug!(recipient_name = %recipient_name, "recipient verified");
        Ok(Verification {
            recipient_name,
            recipient_number: recipient,
            amount,
        })
    }

    // -----------------------------------------------------------------------
    // Phase 2
    // -----------------------------------------------------------------------

    /// Authenticate with the PIN and commit the transfer.
    #[instrument(
        skip_all,
        fields(sender = %sender, recipient = %request.recipient, amount = %request.amount)
    )]
    pub fn transfer(&self, sender: UserId, request: TransferRequest) -> LedgerResult<TransferReceipt> {
        let pin = match request.pin.as_deref().map(str::trim) {
            Some(pin) if !pin.is_empty() => Pin::parse(pin)?,
            _ => return Err(LedgerError::PinRequired),
        };
        if !self.identity.verify_pin(sender, &pin)? {
            warn!("transfer rejected: PIN mismatch");
            return Err(LedgerError::InvalidPin);
        }

        let amount = request.amount.ensure_positive()?;
        let description = normalize_description(request.description.as_deref())?;

        if let Some(key) = request.idempotency_key {
            if let Some(receipt) = self.replay(sender, key, &request)? {
                return Ok(receipt);
            }
        }

        let from = self.wallets.get_wallet(sender)?;
        if from.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                available: from.balance,
                requested: amount,
            });
        }

        let to = self.resolve_recipient(request.recipient)?;
        if to.number == from.number {
            return Err(LedgerError::InvalidRecipient);
        }
        let receiver_name = self.identity.display_name(to.owner)?;

        let outcome = self.wallets.locks().with_pair(from.number, to.number, || {
            let seq = self.db.generate_id()?;
            let now = Utc::now();
            let tx = Transaction {
                id: Uuid::new_v4(),
                sender,
                receiver: to.owner,
                amount,
                receiver_name: receiver_name.clone(),
                receiver_account_number: to.number,
                description: description.clone(),
                created_at: now,
                idempotency_key: request.idempotency_key,
            };
            let outcome = (
                &self.db.wallets,
                &self.db.transactions,
                &self.db.participants,
                &self.db.idempotency,
            )
                .transaction(|(wallets, transactions, participants, idempotency)| -> StagedResult<Outcome> {
                    if let Some(key) = request.idempotency_key {
                        if let Some(prior) =
                            stage_prior(transactions, idempotency, sender, key, &request)?
                        {
                            let balance = stage_read_wallet(wallets, from.number)?.balance;
                            return Ok(Outcome::Replayed(prior, balance));
                        }
                    }

                    let mut payer = stage_read_wallet(wallets, from.number)?;
                    let mut payee = stage_read_wallet(wallets, to.number)?;
                    let balance = staged(payer.apply(BalanceDelta::Debit(amount), now))?;
                    staged(payee.apply(BalanceDelta::Credit(amount), now))?;
                    stage_write_wallet(wallets, &payer)?;
                    stage_write_wallet(wallets, &payee)?;

                    TransactionLog::record_transfer(transactions, participants, &tx, seq)?;
                    if let Some(key) = request.idempotency_key {
                        let slot = pair_key(sender.as_uuid(), key.as_uuid());
                        idempotency.insert(&slot[..], &tx.id.as_bytes()[..])?;
                    }
                    Ok(Outcome::Committed(tx.clone(), balance))
                })?;
            Ok(outcome)
        })?;

        match outcome {
            Outcome::Committed(transaction, balance) => {
                self.wallets.maybe_flush()?;
                info!(tx_id = %transaction.id, balance = %balance, "transfer committed");
                Ok(TransferReceipt {
                    transaction,
                    balance,
                    replayed: false,
                })
            }
            Outcome::Replayed(transaction, balance) => {
                info!(tx_id = %transaction.id, "transfer replayed under lock");
                Ok(TransferReceipt {
                    transaction,
                    balance,
                    replayed: true,
                })
            }
        }
    }

    /// The transaction log this engine appends to.
    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn resolve_recipient(&self, number: WalletNumber) -> LedgerResult<Wallet> {
        match self.wallets.find_wallet_by_number(number) {
            Ok(wallet) => Ok(wallet),
            Err(LedgerError::WalletNotFound(_)) => Err(LedgerError::RecipientNotFound(number)),
            Err(e) => Err(e),
        }
    }

    /// Lock-free replay check, so a retry still succeeds after the first
    /// commit has drained the balance.
    fn replay(
        &self,
        sender: UserId,
        key: IdempotencyKey,
        request: &TransferRequest,
    ) -> LedgerResult<Option<TransferReceipt>> {
        let slot = pair_key(sender.as_uuid(), key.as_uuid());
        let Some(raw) = self.db.idempotency.get(slot)? else {
            return Ok(None);
        };
        let id = uuid_from_bytes(&raw)
            .ok_or_else(|| DbError::Serialization("malformed idempotency entry".into()))?;
        let prior = self
            .log
            .find(id)?
            .ok_or_else(|| DbError::NotFound(format!("transaction {id}")))?;
        ensure_same_transfer(&prior, key, request)?;

        let balance = self.wallets.get_wallet(sender)?.balance;
        info!(tx_id = %prior.id, key = %key, "transfer replayed");
        Ok(Some(TransferReceipt {
            transaction: prior,
            balance,
            replayed: true,
        }))
    }
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("wallets", &self.wallets)
            .finish_non_exhaustive()
    }
}

/// Look up an earlier commit under `key` inside the commit transaction.
fn stage_prior(
    transactions: &TransactionalTree,
    idempotency: &TransactionalTree,
    sender: UserId,
    key: IdempotencyKey,
    request: &TransferRequest,
) -> StagedResult<Option<Transaction>> {
    let slot = pair_key(sender.as_uuid(), key.as_uuid());
    let Some(raw) = idempotency.get(&slot[..])? else {
        return Ok(None);
    };
    let id = staged(
        uuid_from_bytes(&raw).ok_or_else(|| DbError::Serialization("malformed idempotency entry".into())),
    )?;
    let prior: Transaction = match transactions.get(id.as_bytes())? {
        Some(bytes) => staged(decode(&bytes))?,
        None => return sled::transaction::abort(DbError::NotFound(format!("transaction {id}")).into()),
    };
    staged(ensure_same_transfer(&prior, key, request))?;
    Ok(Some(prior))
}

fn ensure_same_transfer(
    prior: &Transaction,
    key: IdempotencyKey,
    request: &TransferRequest,
) -> LedgerResult<()> {
    if prior.receiver_account_number == request.recipient && prior.amount == request.amount {
        Ok(())
    } else {
        Err(LedgerError::IdempotencyConflict(key))
    }
}

fn normalize_description(description: Option<&str>) -> LedgerResult<Option<String>> {
    let Some(text) = description.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(LedgerError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(Some(text.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::vault::NumberSource;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// Names and PINs held in memory.
    #[derive(Default)]
    struct StaticIdentity(Mutex<HashMap<UserId, (String, String)>>);

    impl StaticIdentity {
        fn add(&self, user: UserId, name: &str, pin: &str) {
            self.0.lock().insert(user, (name.to_string(), pin.to_string()));
        }
    }

    impl IdentityProvider for StaticIdentity {
        fn display_name(&self, user: UserId) -> LedgerResult<String> {
            self.0
                .lock()
                .get(&user)
                .map(|(name, _)| name.clone())
                .ok_or(LedgerError::UserNotFound(user))
        }

        fn verify_pin(&self, user: UserId, pin: &Pin) -> LedgerResult<bool> {
            Ok(self
                .0
                .lock()
                .get(&user)
                .map(|(_, stored)| stored == pin.expose())
                .unwrap_or(false))
        }
    }

    /// Hands out numbers in the order given.
    struct Sequence(Mutex<Vec<u32>>);

    impl NumberSource for Sequence {
        fn draw(&self) -> u32 {
            self.0.lock().remove(0)
        }
    }

    struct Fixture {
        engine: TransferEngine,
        wallets: WalletStore,
        identity: Arc<StaticIdentity>,
        db: LedgerDb,
        alice: UserId,
        bob: UserId,
        bob_number: WalletNumber,
    }

    fn fixture(config: LedgerConfig) -> Fixture {
        let db = LedgerDb::open_temporary().unwrap();
        let wallets = WalletStore::new(db.clone(), config)
            .with_number_source(Arc::new(Sequence(Mutex::new(vec![7, 42, 99]))));
        let identity = Arc::new(StaticIdentity::default());
        let engine = TransferEngine::new(db.clone(), wallets.clone(), identity.clone());

        let alice = UserId::new();
        let bob = UserId::new();
        wallets.create_wallet(alice).unwrap();
        let bob_number = wallets.create_wallet(bob).unwrap().number;
        identity.add(alice, "Alice Owusu", "1234");
        identity.add(bob, "Bob Mensah", "4321");

        Fixture {
            engine,
            wallets,
            identity,
            db,
            alice,
            bob,
            bob_number,
        }
    }

    fn quiet_config() -> LedgerConfig {
        LedgerConfig {
            flush_on_commit: false,
            ..LedgerConfig::default()
        }
    }

    fn amount(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn transfer_moves_money_and_records_it() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("100.00")).unwrap();
        assert_eq!(f.bob_number.as_str(), "000042");

        let receipt = f
            .engine
            .transfer(
                f.alice,
                TransferRequest::new(f.bob_number, amount("30.00"))
                    .with_pin("1234")
                    .with_description("market stall"),
            )
            .unwrap();

        assert!(!receipt.replayed);
        assert_eq!(receipt.balance, amount("70.00"));
        assert_eq!(receipt.transaction.receiver_name, "Bob Mensah");
        assert_eq!(receipt.transaction.description.as_deref(), Some("market stall"));
        assert_eq!(f.wallets.get_wallet(f.bob).unwrap().balance, amount("30.00"));
        assert_eq!(f.db.transaction_count(), 1);
        assert_eq!(
            f.engine.log().get_by_id(f.bob, receipt.transaction.id).unwrap(),
            receipt.transaction
        );
    }

    #[test]
    fn back_to_back_transfers_list_in_commit_order() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("100.00")).unwrap();

        let committed: Vec<Uuid> = (1..=10)
            .map(|cents| {
                f.engine
                    .transfer(
                        f.alice,
                        TransferRequest::new(f.bob_number, Amount::from_minor(cents)).with_pin("1234"),
                    )
                    .unwrap()
                    .transaction
                    .id
            })
            .collect();

        let newest_first: Vec<Uuid> = committed.into_iter().rev().collect();
        for user in [f.alice, f.bob] {
            let listed: Vec<Uuid> = f
                .engine
                .log()
                .list_for(user, None)
                .map(|r| r.unwrap().id)
                .collect();
            assert_eq!(listed, newest_first);
        }
    }

    #[test]
    fn verify_returns_name_and_changes_nothing() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("10.00")).unwrap();

        for _ in 0..3 {
            let v = f.engine.verify(f.alice, f.bob_number, amount("5.00")).unwrap();
            assert_eq!(v.recipient_name, "Bob Mensah");
        }
        assert_eq!(f.wallets.get_wallet(f.alice).unwrap().balance, amount("10.00"));
        assert_eq!(f.db.transaction_count(), 0);
    }

    #[test]
    fn verify_unknown_number_is_recipient_not_found() {
        let f = fixture(quiet_config());
        let unknown = WalletNumber::parse("123456").unwrap();
        let err = f.engine.verify(f.alice, unknown, amount("1.00")).unwrap_err();
        assert!(matches!(err, LedgerError::RecipientNotFound(n) if n == unknown));
    }

    #[test]
    fn verify_rejects_zero_amount() {
        let f = fixture(quiet_config());
        let err = f.engine.verify(f.alice, f.bob_number, Amount::ZERO).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[test]
    fn missing_or_blank_pin_is_required() {
        let f = fixture(quiet_config());
        let req = TransferRequest::new(f.bob_number, amount("1.00"));
        assert!(matches!(
            f.engine.transfer(f.alice, req.clone()),
            Err(LedgerError::PinRequired)
        ));
        assert!(matches!(
            f.engine.transfer(f.alice, req.with_pin("  ")),
            Err(LedgerError::PinRequired)
        ));
    }

    #[test]
    fn malformed_pin_is_validation_error() {
        let f = fixture(quiet_config());
        let req = TransferRequest::new(f.bob_number, amount("1.00")).with_pin("12a4");
        assert!(matches!(
            f.engine.transfer(f.alice, req),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn wrong_pin_is_unauthorized_and_moves_nothing() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("100.00")).unwrap();
        let err = f
            .engine
            .transfer(
                f.alice,
                TransferRequest::new(f.bob_number, amount("30.00")).with_pin("9999"),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPin));
        assert_eq!(f.wallets.get_wallet(f.alice).unwrap().balance, amount("100.00"));
        assert_eq!(f.wallets.get_wallet(f.bob).unwrap().balance, Amount::ZERO);
        assert_eq!(f.db.transaction_count(), 0);
    }

    #[test]
    fn overdraft_is_insufficient_funds() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("20.00")).unwrap();
        let err = f
            .engine
            .transfer(
                f.alice,
                TransferRequest::new(f.bob_number, amount("50.00")).with_pin("1234"),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(f.wallets.get_wallet(f.alice).unwrap().balance, amount("20.00"));
    }

    #[test]
    fn self_transfer_is_invalid_recipient() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("20.00")).unwrap();
        let own = f.wallets.get_wallet(f.alice).unwrap().number;
        let err = f
            .engine
            .transfer(f.alice, TransferRequest::new(own, amount("5.00")).with_pin("1234"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecipient));
    }

    #[test]
    fn unknown_recipient_on_commit() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("20.00")).unwrap();
        let unknown = WalletNumber::parse("555555").unwrap();
        let err = f
            .engine
            .transfer(f.alice, TransferRequest::new(unknown, amount("5.00")).with_pin("1234"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::RecipientNotFound(_)));
    }

    #[test]
    fn long_description_is_rejected() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("20.00")).unwrap();
        let req = TransferRequest::new(f.bob_number, amount("1.00"))
            .with_pin("1234")
            .with_description("x".repeat(MAX_DESCRIPTION_CHARS + 1));
        assert!(matches!(
            f.engine.transfer(f.alice, req),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn same_key_commits_once() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("50.00")).unwrap();
        let key = IdempotencyKey::random();
        let req = TransferRequest::new(f.bob_number, amount("30.00"))
            .with_pin("1234")
            .with_idempotency_key(key);

        let first = f.engine.transfer(f.alice, req.clone()).unwrap();
        // The balance no longer covers a second 30.00; the retry must still succeed.
        let second = f.engine.transfer(f.alice, req).unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.transaction.id, second.transaction.id);
        assert_eq!(second.balance, amount("20.00"));
        assert_eq!(f.db.transaction_count(), 1);
        assert_eq!(f.wallets.get_wallet(f.bob).unwrap().balance, amount("30.00"));
    }

    #[test]
    fn reused_key_with_new_amount_conflicts() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("50.00")).unwrap();
        let key = IdempotencyKey::random();
        let base = TransferRequest::new(f.bob_number, amount("10.00"))
            .with_pin("1234")
            .with_idempotency_key(key);
        f.engine.transfer(f.alice, base.clone()).unwrap();

        let changed = TransferRequest {
            amount: amount("11.00"),
            ..base
        };
        let err = f.engine.transfer(f.alice, changed).unwrap_err();
        assert!(matches!(err, LedgerError::IdempotencyConflict(k) if k == key));
        assert_eq!(f.db.transaction_count(), 1);
    }

    #[test]
    fn idempotency_keys_are_per_sender() {
        let f = fixture(quiet_config());
        f.wallets.deposit(f.alice, amount("50.00")).unwrap();
        f.wallets.deposit(f.bob, amount("50.00")).unwrap();
        let alice_number = f.wallets.get_wallet(f.alice).unwrap().number;
        let key = IdempotencyKey::random();

        f.engine
            .transfer(
                f.alice,
                TransferRequest::new(f.bob_number, amount("5.00"))
                    .with_pin("1234")
                    .with_idempotency_key(key),
            )
            .unwrap();
        let bobs = f
            .engine
            .transfer(
                f.bob,
                TransferRequest::new(alice_number, amount("7.00"))
                    .with_pin("4321")
                    .with_idempotency_key(key),
            )
            .unwrap();
        assert!(!bobs.replayed);
        assert_eq!(f.db.transaction_count(), 2);
    }

    #[test]
    fn held_wallet_reports_busy() {
        let config = LedgerConfig {
            lock_timeout: Duration::from_millis(50),
            ..quiet_config()
        };
        let f = fixture(config);
        f.wallets.deposit(f.alice, amount("50.00")).unwrap();

        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let wallets = f.wallets.clone();
        let bob_number = f.bob_number;
        let holder = thread::spawn(move || {
            wallets
                .locks()
                .with_one(bob_number, || {
                    held_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(())
                })
                .unwrap();
        });

        held_rx.recv().unwrap();
        let err = f
            .engine
            .transfer(
                f.alice,
                TransferRequest::new(f.bob_number, amount("5.00")).with_pin("1234"),
            )
            .unwrap_err();
        assert!(err.is_retryable());
        release_tx.send(()).unwrap();
        holder.join().unwrap();

        assert_eq!(f.wallets.get_wallet(f.alice).unwrap().balance, amount("50.00"));
        assert_eq!(f.db.transaction_count(), 0);
        assert!(f.identity.display_name(f.bob).is_ok());
    }
}
