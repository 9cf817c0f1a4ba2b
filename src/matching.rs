//! The matching engine: price-time priority walk over the opposite-side
//! half-book, per spec §4.2.
//!
//! The incoming order is always the taker; every fill executes at the
//! resting (maker) order's price, never the taker's — the taker's limit
//! price is only a bound on which maker levels are eligible, never the
//! execution price (spec's "maker-price law").
use std::collections::{BTreeMap, VecDeque};

use uuid::Uuid;

use crate::{
    orderbook::{OrderBook, OrderBookEntry},
    orders::{OrderKind, Side},
};

/// One matched leg: the maker order that was hit, at what price, for how
/// much. The caller (coordinator) turns this into a [`crate::trade::Trade`]
/// and applies the corresponding ledger transfers.
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub maker_order_id: Uuid,
    pub price: u64,
    pub qty: u64,
}

/// Result of a match walk: the fills produced, in maker-hit order, and
/// the quantity left unfilled (always 0 for a market order that the
/// coordinator admitted, since that path only admits fully-fillable
/// market orders; possibly nonzero for a limit order).
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub fills: Vec<Fill>,
    pub residual: u64,
}

/// Returns `true` if a resting entry at `price` is still eligible for a
/// limit taker bounded by `limit_price` (step 2a of the algorithm).
/// Market orders have no bound and always cross.
fn within_limit(taker_side: Side, kind: OrderKind, limit_price: Option<u64>, price: u64) -> bool {
    if kind == OrderKind::Market {
        return true;
    }
    match (taker_side, limit_price) {
        (Side::Buy, Some(limit)) => price <= limit,
        (Side::Sell, Some(limit)) => price >= limit,
        _ => true,
    }
}

/// Walks `half` (the opposite-side book) mutating it as fills are
/// produced: an emptied maker entry is removed, and an emptied price
/// level is pruned, atomically with the fill that zeroed it (spec
/// §4.1 edge policy).
fn walk_and_fill(
    half: &mut BTreeMap<u64, VecDeque<OrderBookEntry>>,
    reversed: bool,
    taker_side: Side,
    kind: OrderKind,
    limit_price: Option<u64>,
    mut remaining: u64,
) -> (Vec<Fill>, u64) {
    let mut fills = Vec::new();
    let mut levels_to_remove = Vec::new();

    let prices: Vec<u64> = if reversed {
        half.keys().rev().copied().collect()
    } else {
        half.keys().copied().collect()
    };

    'outer: for price in prices {
        if !within_limit(taker_side, kind, limit_price, price) {
            break;
        }
        let level = half.get_mut(&price).expect("price came from this map");
        while remaining > 0 {
            let Some(entry) = level.front_mut() else {
                break;
            };
            let traded = remaining.min(entry.remaining);
            fills.push(Fill {
                maker_order_id: entry.order_id,
                price,
                qty: traded,
            });
            entry.remaining -= traded;
            remaining -= traded;
            if entry.remaining == 0 {
                level.pop_front();
            }
        }
        if level.is_empty() {
            levels_to_remove.push(price);
        }
        if remaining == 0 {
            break 'outer;
        }
    }

    for price in levels_to_remove {
        half.remove(&price);
    }

    (fills, remaining)
}

/// Matches `qty` of `taker_side`/`kind` (bounded by `limit_price` for a
/// limit order) against `book`, mutating it in place. Returns the fills
/// and the residual quantity.
pub fn apply_match(
    book: &mut OrderBook,
    taker_side: Side,
    kind: OrderKind,
    qty: u64,
    limit_price: Option<u64>,
) -> MatchOutcome {
    let opposite = taker_side.opposite();
    let (half, reversed) = match opposite {
        // bids are keyed ascending; matching a sell walks them highest-first
        Side::Buy => (&mut book.bids, true),
        Side::Sell => (&mut book.asks, false),
    };
    let (fills, residual) = walk_and_fill(half, reversed, taker_side, kind, limit_price, qty);
    MatchOutcome { fills, residual }
}

/// Simulates a match without mutating the book — used by the coordinator
/// to pre-check market-order fillability and cost (spec §4.2's
/// market-order pre-check, and §4.5 step 2's dry-run reservation sizing).
/// Returns `(fillable_qty, total_cost)`.
pub fn dry_run(
    book: &OrderBook,
    taker_side: Side,
    kind: OrderKind,
    qty: u64,
    limit_price: Option<u64>,
) -> (u64, u64) {
    let opposite = taker_side.opposite();
    let mut remaining = qty;
    let mut cost: u64 = 0;

    for (price, entry) in book.iter_best(opposite) {
        if remaining == 0 {
            break;
        }
        if !within_limit(taker_side, kind, limit_price, price) {
            break;
        }
        let traded = remaining.min(entry.remaining);
        cost += traded * price;
        remaining -= traded;
    }

    (qty - remaining, cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::Side;
    use uuid::Uuid;

    fn rest(book: &mut OrderBook, side: Side, price: u64, id: u128, qty: u64, tick: u64) {
        book.insert(
            side,
            price,
            OrderBookEntry {
                order_id: Uuid::from_u128(id),
                remaining: qty,
                created_tick: tick,
            },
        );
    }

    /// Scenario 3 from spec §8: a market buy sweeping two ask levels.
    #[test]
    fn market_buy_sweeps_two_levels() {
        let mut book = OrderBook::new();
        rest(&mut book, Side::Sell, 100, 1, 1, 0);
        rest(&mut book, Side::Sell, 110, 2, 2, 1);

        let outcome = apply_match(&mut book, Side::Buy, OrderKind::Market, 3, None);
        assert_eq!(outcome.residual, 0);
        assert_eq!(outcome.fills.len(), 2);
        assert_eq!((outcome.fills[0].price, outcome.fills[0].qty), (100, 1));
        assert_eq!((outcome.fills[1].price, outcome.fills[1].qty), (110, 2));
        assert!(book.asks.is_empty());
    }

    #[test]
    fn maker_price_law_trade_executes_at_resting_price_not_taker_limit() {
        let mut book = OrderBook::new();
        rest(&mut book, Side::Sell, 100, 1, 2, 0);

        let outcome = apply_match(&mut book, Side::Buy, OrderKind::Limit, 2, Some(150));
        assert_eq!(outcome.fills[0].price, 100);
        assert_eq!(outcome.residual, 0);
    }

    #[test]
    fn limit_order_stops_at_worse_than_limit_price() {
        let mut book = OrderBook::new();
        rest(&mut book, Side::Sell, 100, 1, 5, 0);
        rest(&mut book, Side::Sell, 200, 2, 5, 1);

        // Buy limit at 150 should only cross the 100 level, not the 200 one.
        let outcome = apply_match(&mut book, Side::Buy, OrderKind::Limit, 10, Some(150));
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.residual, 5);
        assert!(book.asks.contains_key(&200));
    }

    #[test]
    fn price_time_priority_fills_earlier_maker_first_at_same_price() {
        let mut book = OrderBook::new();
        rest(&mut book, Side::Sell, 10, 1, 1, 1); // A, t=1
        rest(&mut book, Side::Sell, 10, 2, 1, 2); // B, t=2

        let outcome = apply_match(&mut book, Side::Buy, OrderKind::Market, 1, None);
        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.fills[0].maker_order_id, Uuid::from_u128(1));
    }

    #[test]
    fn dry_run_does_not_mutate_book() {
        let mut book = OrderBook::new();
        rest(&mut book, Side::Sell, 100, 1, 5, 0);

        let (fillable, cost) = dry_run(&book, Side::Buy, OrderKind::Market, 3, None);
        assert_eq!(fillable, 3);
        assert_eq!(cost, 300);
        assert_eq!(book.asks.get(&100).unwrap()[0].remaining, 5);
    }

    #[test]
    fn dry_run_reports_partial_fillability_on_empty_book() {
        let book = OrderBook::new();
        let (fillable, cost) = dry_run(&book, Side::Buy, OrderKind::Market, 1, None);
        assert_eq!(fillable, 0);
        assert_eq!(cost, 0);
    }
}
