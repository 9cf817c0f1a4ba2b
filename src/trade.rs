//! A trade represents a matched transaction between two orders.
//!
//! - The price comes from the maker's order (the resting order).
//! - Quantity is the amount filled.
//! - `buy_order_id`/`sell_order_id` identify the two legs directly,
//!   rather than maker/taker, so a trade record reads the same way
//!   regardless of which side was resting.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub buy_order_id: Uuid,
    pub sell_order_id: Uuid,
    pub instrument: String,
    pub price: u64,
    pub qty: u64,
    pub tick: u64,
}
