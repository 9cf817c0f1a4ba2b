//! Order types and the status lifecycle described in spec §3:
//!
//! ```text
//! NEW ── partial match ──▶ PARTIALLY_EXECUTED ── further match ──▶ EXECUTED
//!  │                             │
//!  └── full match ──▶ EXECUTED   └── cancel ──▶ CANCELLED
//!  │
//!  └── cancel ──▶ CANCELLED
//! ```
//!
//! Market orders never occupy `New`: they resolve synchronously to
//! `Executed` or `Cancelled` at admission time.
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// A monotonically increasing counter standing in for a dedicated trade
/// clock (spec §9 open question: "Recommendation: distinct monotonic
/// clock"). Wall-clock `SystemTime` alone cannot disambiguate a burst of
/// same-millisecond submissions; this counter can.
static SEQ: AtomicU64 = AtomicU64::new(0);

/// Returns the next tick of the process-wide monotonic clock, used to
/// order orders and trades for price-time priority and for the
/// persisted key layout in `store.rs`.
pub fn next_tick() -> u64 {
    SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Reseeds the tick counter so the next [`next_tick`] call returns at
/// least `floor + 1`. Called once at startup, before any order is
/// admitted, with the highest tick already persisted in the store
/// (`Store::max_tick`) — ticks are part of the store's persisted
/// "source of truth for recovery" (spec §4.4), so after a restart they
/// must keep increasing, not restart from zero and collide with or
/// sort behind ticks issued before the restart.
pub fn seed_tick(floor: u64) {
    SEQ.fetch_max(floor + 1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The book side an incoming order of this side matches against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyExecuted,
    Executed,
    Cancelled,
}

impl OrderStatus {
    /// Terminal statuses appear in no half-book (spec §8 invariant 6).
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Executed | OrderStatus::Cancelled)
    }
}

/// A resting or historical order. Immutable at creation except for its
/// `status` and `filled` counter; the Order Store is the sole owner of
/// this record (spec §3 "Ownership").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub owner: Uuid,
    pub instrument: String,
    pub side: Side,
    pub kind: OrderKind,
    pub qty: u64,
    pub price: Option<u64>,
    pub filled: u64,
    pub status: OrderStatus,
    pub created_tick: u64,
}

impl Order {
    pub fn remaining(&self) -> u64 {
        self.qty - self.filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_tick_pushes_the_counter_above_the_floor() {
        seed_tick(1_000_000);
        assert!(next_tick() > 1_000_000);
    }

    #[test]
    fn seed_tick_never_moves_the_counter_backwards() {
        seed_tick(2_000_000);
        let after_first_seed = next_tick();
        seed_tick(10); // a lower floor, as if the store held fewer ticks
        assert!(next_tick() > after_first_seed);
    }
}
