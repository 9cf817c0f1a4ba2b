//! Per-instrument order book: two half-books, `bids` and `asks`, each an
//! ordered collection of resting limit entries totally ordered by
//! `(price, created_tick)` — `created_tick` (spec §9's monotonic trade
//! clock) is the tie-breaker that gives price-time priority within a
//! level, and doubles as the final deterministic tie-breaker so no two
//! entries ever compare equal.
//!
//! The book holds only order-ids plus denormalized `(price, remaining,
//! created_tick)` — never whole [`Order`] records (spec §3 Ownership,
//! §9 "the Order Book holds order-ids ... it does not own orders"). The
//! Order Store remains the source of truth for order status and history.
use crate::orders::Side;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

/// A resting limit order as seen by the book: `remaining = qty - filled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    pub order_id: Uuid,
    pub remaining: u64,
    pub created_tick: u64,
}

/// One aggregated price level, as exposed by the public level-2 snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Level {
    pub price: u64,
    pub qty: u64,
}

/// Internal enum unifying forward (asks, ascending) and reverse (bids,
/// descending) `BTreeMap` iteration under one type, mirroring the
/// teacher's `EitherIter`.
enum EitherIter<'a> {
    Fwd(std::collections::btree_map::Iter<'a, u64, VecDeque<OrderBookEntry>>),
    Rev(std::iter::Rev<std::collections::btree_map::Iter<'a, u64, VecDeque<OrderBookEntry>>>),
}

impl<'a> Iterator for EitherIter<'a> {
    type Item = (&'a u64, &'a VecDeque<OrderBookEntry>);
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            EitherIter::Fwd(it) => it.next(),
            EitherIter::Rev(it) => it.next(),
        }
    }
}

/// A single instrument's order book: asks sorted ascending by price,
/// bids sorted descending, both FIFO by `created_tick` within a level.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: BTreeMap<u64, VecDeque<OrderBookEntry>>,
    pub asks: BTreeMap<u64, VecDeque<OrderBookEntry>>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn side_map(&mut self, side: Side) -> &mut BTreeMap<u64, VecDeque<OrderBookEntry>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Inserts a resting entry. Panics if `entry.order_id` is already
    /// present at `price` — the spec frames a duplicate insert as a
    /// programmer error, not a runtime condition callers should handle.
    pub fn insert(&mut self, side: Side, price: u64, entry: OrderBookEntry) {
        let level = self.side_map(side).entry(price).or_default();
        debug_assert!(
            level.iter().all(|e| e.order_id != entry.order_id),
            "duplicate order-id inserted into book"
        );
        level.push_back(entry);
    }

    /// Removes the entry for `order_id` from either side. No-op if
    /// absent — cancellation of an already-filled order races against
    /// matching and that race is expected, not an error.
    pub fn remove(&mut self, order_id: Uuid) -> bool {
        for side in [Side::Buy, Side::Sell] {
            let map = self.side_map(side);
            let mut found_price = None;
            for (price, level) in map.iter_mut() {
                if let Some(pos) = level.iter().position(|e| e.order_id == order_id) {
                    level.remove(pos);
                    found_price = Some((*price, level.is_empty()));
                    break;
                }
            }
            if let Some((price, now_empty)) = found_price {
                if now_empty {
                    map.remove(&price);
                }
                return true;
            }
        }
        false
    }

    /// Lazily walks entries from the best price outward: ascending for
    /// asks, descending for bids.
    pub fn iter_best(&self, side: Side) -> impl Iterator<Item = (u64, &OrderBookEntry)> {
        let map = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        let iter = match side {
            Side::Buy => EitherIter::Rev(map.iter().rev()),
            Side::Sell => EitherIter::Fwd(map.iter()),
        };
        iter.flat_map(|(&price, level)| level.iter().map(move |e| (price, e)))
    }

    /// Peeks the best price on `side` without consuming anything.
    pub fn best_price(&self, side: Side) -> Option<u64> {
        match side {
            Side::Buy => self.bids.keys().next_back().copied(),
            Side::Sell => self.asks.keys().next().copied(),
        }
    }

    /// Returns the top `depth` price levels, aggregated as `(price,
    /// total remaining qty)`, best price first.
    pub fn snapshot_levels(&self, side: Side, depth: usize) -> Vec<Level> {
        let map = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        let levels = |iter: &mut dyn Iterator<Item = (&u64, &VecDeque<OrderBookEntry>)>| {
            iter.take(depth)
                .map(|(&price, level)| Level {
                    price,
                    qty: level.iter().map(|e| e.remaining).sum(),
                })
                .collect::<Vec<_>>()
        };
        match side {
            Side::Buy => levels(&mut map.iter().rev()),
            Side::Sell => levels(&mut map.iter()),
        }
    }

    /// Decrements the remaining quantity of `order_id` at `price` by
    /// `qty`, removing the entry (and pruning an emptied price level)
    /// atomically if it reaches zero. Returns `true` if the entry was
    /// found, regardless of whether it was fully consumed.
    pub fn fill(&mut self, side: Side, price: u64, order_id: Uuid, qty: u64) -> bool {
        let map = self.side_map(side);
        let Some(level) = map.get_mut(&price) else {
            return false;
        };
        let Some(pos) = level.iter().position(|e| e.order_id == order_id) else {
            return false;
        };
        level[pos].remaining -= qty;
        if level[pos].remaining == 0 {
            level.remove(pos);
            if level.is_empty() {
                map.remove(&price);
            }
        }
        true
    }
}
