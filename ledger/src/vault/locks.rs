//! # Per-Wallet Locks
//!
//! A lock table keyed by wallet number. Commits take the locks of exactly
//! the wallets they touch, in ascending number order, so two transfers
//! between the same pair in opposite directions cannot deadlock.
//!
//! Every acquisition is bounded by a timeout. A commit that cannot get its
//! locks fails with [`LedgerError::Busy`] and the caller retries.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::wallet::WalletNumber;
use crate::error::{LedgerError, LedgerResult};

/// Lock table for wallet balances.
#[derive(Debug)]
pub struct WalletLocks {
    table: DashMap<WalletNumber, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl WalletLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: DashMap::new(),
            timeout,
        }
    }

    /// The configured acquisition timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // The shard guard is dropped before anyone blocks on the mutex.
    fn handle(&self, number: WalletNumber) -> Arc<Mutex<()>> {
        self.table.entry(number).or_default().value().clone()
    }

    /// Run `f` while holding one wallet's lock.
    pub fn with_one<T>(
        &self,
        number: WalletNumber,
        f: impl FnOnce() -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let handle = self.handle(number);
        let _guard = handle
            .try_lock_for(self.timeout)
            .ok_or(LedgerError::Busy(number))?;
        f()
    }

    /// Run `f` while holding both wallets' locks, taken in ascending order.
    pub fn with_pair<T>(
        &self,
        a: WalletNumber,
        b: WalletNumber,
        f: impl FnOnce() -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        if a == b {
            return self.with_one(a, f);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };

        let first_handle = self.handle(first);
        let second_handle = self.handle(second);

        let _first = first_handle
            .try_lock_for(self.timeout)
            .ok_or(LedgerError::Busy(first))?;
        let _second = second_handle
            .try_lock_for(self.timeout)
            .ok_or(LedgerError::Busy(second))?;
        f()
    }

    /// Number of wallets that have ever been locked.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    fn number(n: u32) -> WalletNumber {
        WalletNumber::from_u32(n).unwrap()
    }

    #[test]
    fn with_pair_runs_closure() {
        let locks = WalletLocks::new(Duration::from_millis(100));
        let out = locks.with_pair(number(2), number(1), || Ok(7)).unwrap();
        assert_eq!(out, 7);
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn same_wallet_pair_does_not_self_deadlock() {
        let locks = WalletLocks::new(Duration::from_millis(50));
        let out = locks.with_pair(number(5), number(5), || Ok("ok")).unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn held_lock_times_out_as_busy() {
        let locks = Arc::new(WalletLocks::new(Duration::from_millis(50)));
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                locks
                    .with_one(number(1), || {
                        held_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            })
        };

        held_rx.recv().unwrap();
        let err = locks.with_pair(number(2), number(1), || Ok(())).unwrap_err();
        assert!(matches!(err, LedgerError::Busy(n) if n == number(1)));
        assert!(err.is_retryable());

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(locks.with_pair(number(1), number(2), || Ok(())).is_ok());
    }

    #[test]
    fn opposite_directions_do_not_deadlock() {
        let locks = Arc::new(WalletLocks::new(Duration::from_secs(5)));
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let (a, b) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                        locks
                            .with_pair(number(a), number(b), || {
                                done.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 8 * 200);
    }
}
