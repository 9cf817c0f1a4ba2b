//! Per-(user, instrument) balance ledger: `available` and `frozen`
//! partitions, with atomic reserve/release/transfer/deposit/withdraw
//! operations (spec §4.3).
//!
//! There is no ledger in the teacher repo to generalize from; this is
//! grounded in `leeleeEcho-polymarket-backend`'s use of `dashmap` for
//! concurrent order-book/account state, since that is the pack's other
//! exchange-shaped repo and the teacher itself never needed balances.
//! A per-user `tokio::sync::Mutex` layers over the `DashMap` to satisfy
//! spec §5's requirement that a single user's RUB row serializes across
//! concurrent submissions on different instruments.
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient funds")]
    InsufficientFunds,
}

/// A user's holdings of one instrument: non-negative `available` and
/// `frozen` partitions (spec §3 invariant).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balance {
    pub available: u64,
    pub frozen: u64,
}

pub struct Ledger {
    balances: DashMap<(Uuid, String), Balance>,
    user_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            user_locks: DashMap::new(),
        }
    }

    fn lock_handle(&self, user: Uuid) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Snapshot of a user's balance in `instrument`. Rows are created
    /// lazily on first deposit or reservation, so an unseen pair simply
    /// reads as zero (spec §3, §9 open question: keep zero rows once
    /// created, but don't manufacture one just to read it).
    pub fn balance(&self, user: Uuid, instrument: &str) -> Balance {
        self.balances
            .get(&(user, instrument.to_string()))
            .map(|b| *b)
            .unwrap_or_default()
    }

    /// All instruments with a recorded balance row for `user`.
    pub fn balances_for_user(&self, user: Uuid) -> Vec<(String, Balance)> {
        self.balances
            .iter()
            .filter(|e| e.key().0 == user)
            .map(|e| (e.key().1.clone(), *e.value()))
            .collect()
    }

    /// Moves `amount` from `available` to `frozen`. Fails with
    /// [`LedgerError::InsufficientFunds`] if available is short. Returns
    /// the resulting balance so the caller can persist it through the
    /// store in the same commit as the order it belongs to (spec §4.4).
    pub async fn reserve(&self, user: Uuid, instrument: &str, amount: u64) -> Result<Balance, LedgerError> {
        let lock = self.lock_handle(user);
        let _guard: MutexGuard<'_, ()> = lock.lock().await;
        let mut bal = self.balances.entry((user, instrument.to_string())).or_default();
        if bal.available < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        bal.available -= amount;
        bal.frozen += amount;
        Ok(*bal)
    }

    /// Moves `amount` from `frozen` back to `available`. A precondition
    /// violation (releasing more than is frozen) is a coordinator bug,
    /// not a recoverable error — it panics in debug builds and saturates
    /// in release rather than ever going negative. Returns the resulting
    /// balance for persistence.
    pub async fn release(&self, user: Uuid, instrument: &str, amount: u64) -> Balance {
        let lock = self.lock_handle(user);
        let _guard = lock.lock().await;
        let mut bal = self.balances.entry((user, instrument.to_string())).or_default();
        debug_assert!(
            bal.frozen >= amount,
            "release({amount}) exceeds frozen balance {}",
            bal.frozen
        );
        bal.frozen = bal.frozen.saturating_sub(amount);
        bal.available += amount;
        *bal
    }

    /// Moves `amount` out of `from`'s frozen partition into `to`'s
    /// available partition — the per-trade settlement leg (spec §4.3).
    /// Locks both users' rows in a fixed order (by `Uuid`) to avoid
    /// deadlocking against a concurrent transfer running in the other
    /// direction between the same two users. Returns `(from_balance,
    /// to_balance)` after the move, for persistence.
    pub async fn settle_transfer(&self, from: Uuid, to: Uuid, instrument: &str, amount: u64) -> (Balance, Balance) {
        let (first, second) = if from <= to { (from, to) } else { (to, from) };
        let lock_first = self.lock_handle(first);
        let guard_first = lock_first.lock().await;
        let guard_second = if first != second {
            let lock_second = self.lock_handle(second);
            Some(lock_second.lock().await)
        } else {
            None
        };

        let from_after = {
            let mut from_bal = self.balances.entry((from, instrument.to_string())).or_default();
            debug_assert!(
                from_bal.frozen >= amount,
                "settle_transfer source frozen balance underrun"
            );
            from_bal.frozen = from_bal.frozen.saturating_sub(amount);
            *from_bal
        };
        let to_after = {
            let mut to_bal = self.balances.entry((to, instrument.to_string())).or_default();
            to_bal.available += amount;
            *to_bal
        };

        drop(guard_second);
        drop(guard_first);
        (from_after, to_after)
    }

    /// Admin-only funding path: no matching reservation, no precondition.
    /// Returns the resulting balance for persistence.
    pub async fn deposit(&self, user: Uuid, instrument: &str, amount: u64) -> Balance {
        let lock = self.lock_handle(user);
        let _guard = lock.lock().await;
        let mut bal = self.balances.entry((user, instrument.to_string())).or_default();
        bal.available += amount;
        *bal
    }

    /// Fails with [`LedgerError::InsufficientFunds`] if available is
    /// short. Frozen funds can never be withdrawn directly. Returns the
    /// resulting balance for persistence.
    pub async fn withdraw(&self, user: Uuid, instrument: &str, amount: u64) -> Result<Balance, LedgerError> {
        let lock = self.lock_handle(user);
        let _guard = lock.lock().await;
        let mut bal = self.balances.entry((user, instrument.to_string())).or_default();
        if bal.available < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        bal.available -= amount;
        Ok(*bal)
    }

    /// Loads a persisted balance row directly, bypassing reserve/release
    /// semantics. Used only at startup, before the server accepts
    /// requests, to rebuild the ledger from the store's `balances`
    /// column (spec §4.4 "source of truth for recovery", §6 "Persisted
    /// state").
    pub fn hydrate(&self, user: Uuid, instrument: &str, balance: Balance) {
        self.balances.insert((user, instrument.to_string()), balance);
    }
}
