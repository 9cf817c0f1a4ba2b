//! Instruments are quoted against the base currency [`RUB`]. A ticker is
//! 2-10 uppercase letters; `RUB` itself is a distinguished instrument that
//! is never traded directly (it is the quote leg of every other one).
use serde::{Deserialize, Serialize};

/// The base currency. Never deactivated, never appears as a tradable
/// instrument in `/public/instrument`.
pub const RUB: &str = "RUB";

/// Returns `true` if `ticker` matches `^[A-Z]{2,10}$`.
pub fn is_valid_ticker(ticker: &str) -> bool {
    let len = ticker.len();
    (2..=10).contains(&len) && ticker.bytes().all(|b| b.is_ascii_uppercase())
}

/// A tradable instrument, quoted against [`RUB`].
///
/// Soft-deleted via `active`; never hard-deleted, since historical trades
/// reference it by ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub active: bool,
}

impl Instrument {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            active: true,
        }
    }
}
