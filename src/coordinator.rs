//! The Admission & Reservation Coordinator (spec §4.5): the only module
//! that touches the order book, the ledger and the store together for a
//! single inbound order, so it is the natural home for the "compute
//! reservation, pre-reserve, match, settle, insert residual" unit of
//! work described there.
//!
//! Grounded in original_source's `tasks/orders.py::execution_orders` for
//! the order in which balance legs are applied per fill, and in
//! `routers/order.py::create_order` for the admission checks that run
//! before a single book mutation happens. The original defers limit
//! matching to a background task; this coordinator folds both paths into
//! one synchronous unit of work, since §5's per-instrument serialization
//! already gives the isolation the original bought with a queue.
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    errors::CoreError,
    instrument::{self, Instrument},
    ledger::{Balance, Ledger},
    matching::{self, Fill},
    orderbook::{OrderBook, OrderBookEntry},
    orders::{Order, OrderKind, OrderStatus, Side, next_tick},
    store::{Store, WriteBatch},
    trade::Trade,
    user::{Role, User},
};

/// Accumulates every order, trade and balance row touched by one unit of
/// work (an order submission or a cancellation) so they land in exactly
/// one `db.commit` (spec §4.4 "all commit or all rollback"). Orders and
/// balances are keyed so that re-touching the same row within the same
/// submission keeps only its final value.
#[derive(Default)]
struct PendingWrites {
    orders: HashMap<Uuid, Order>,
    trades: Vec<Trade>,
    balances: HashMap<(Uuid, String), Balance>,
}

impl PendingWrites {
    fn touch_order(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    fn touch_balance(&mut self, user: Uuid, instrument: &str, balance: Balance) {
        self.balances.insert((user, instrument.to_string()), balance);
    }

    fn into_batch(self) -> Result<WriteBatch, CoreError> {
        let mut batch = WriteBatch::new();
        for order in self.orders.values() {
            batch.stage_order(order)?;
        }
        for trade in &self.trades {
            batch.stage_trade(trade)?;
        }
        for ((user, instrument), balance) in &self.balances {
            batch.stage_balance(*user, instrument, balance)?;
        }
        Ok(batch)
    }
}

/// Request body for order submission, already validated for shape by the
/// API layer (ticker regex, qty ≥ 1, price > 0 if present).
pub struct NewOrder {
    pub owner: Uuid,
    pub instrument: String,
    pub side: Side,
    pub qty: u64,
    pub price: Option<u64>,
}

/// Wires the order book, ledger and store together behind one lock per
/// instrument (spec §5), so matching on TICK_A and TICK_B never blocks
/// each other while still serializing submissions against the same
/// instrument's book.
pub struct Coordinator {
    books: DashMap<String, Arc<Mutex<OrderBook>>>,
    pub ledger: Ledger,
    pub store: Store,
}

impl Coordinator {
    pub fn new(store: Store) -> Self {
        Self {
            books: DashMap::new(),
            ledger: Ledger::new(),
            store,
        }
    }

    fn book_handle(&self, ticker: &str) -> Arc<Mutex<OrderBook>> {
        self.books
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new())))
            .clone()
    }

    /// The aggregated top-`depth` levels on both sides, for the public
    /// level-2 view (spec §6 "Level-2 snapshot format").
    pub async fn snapshot_book(
        &self,
        ticker: &str,
        depth: usize,
    ) -> Result<(Vec<crate::orderbook::Level>, Vec<crate::orderbook::Level>), CoreError> {
        self.require_active_instrument(ticker)?;
        let handle = self.book_handle(ticker);
        let book = handle.lock().await;
        Ok((book.snapshot_levels(Side::Sell, depth), book.snapshot_levels(Side::Buy, depth)))
    }

    /// Rebuilds the in-memory book for `ticker` from the store's open
    /// orders, per spec §5 "on startup, the book is rebuilt by scanning
    /// open orders". Call once per known instrument at startup.
    pub async fn rehydrate_book(&self, ticker: &str) -> Result<(), CoreError> {
        let open = self.store.open_orders_for_instrument(ticker)?;
        let handle = self.book_handle(ticker);
        let mut book = handle.lock().await;
        for order in open {
            book.insert(
                order.side,
                order.price.expect("open order in book must be a limit order"),
                OrderBookEntry {
                    order_id: order.id,
                    remaining: order.remaining(),
                    created_tick: order.created_tick,
                },
            );
        }
        Ok(())
    }

    /// Rebuilds the ledger from the store's persisted `balances` column
    /// (spec §4.4 "source of truth for recovery", §6 "Persisted state").
    /// Call once at startup, alongside [`Coordinator::rehydrate_book`] —
    /// together they restore both halves of spec §8 invariant 2 (a
    /// resting order's owner has a matching frozen reservation) after a
    /// restart.
    pub fn rehydrate_ledger(&self) -> Result<(), CoreError> {
        for (user, instrument, balance) in self.store.list_balances()? {
            self.ledger.hydrate(user, &instrument, balance);
        }
        Ok(())
    }

    /// Admin funding path (spec §6 `POST /admin/balance/deposit`):
    /// credits `available` and persists the resulting row in the same
    /// call, so a deposit is never lost on restart.
    pub async fn deposit(&self, user: Uuid, instrument: &str, amount: u64) -> Result<(), CoreError> {
        let balance = self.ledger.deposit(user, instrument, amount).await;
        self.store.put_balance(user, instrument, &balance)?;
        Ok(())
    }

    /// Admin withdrawal path (spec §6 `POST /admin/balance/withdraw`).
    pub async fn withdraw(&self, user: Uuid, instrument: &str, amount: u64) -> Result<(), CoreError> {
        let balance = self.ledger.withdraw(user, instrument, amount).await?;
        self.store.put_balance(user, instrument, &balance)?;
        Ok(())
    }

    fn require_active_instrument(&self, ticker: &str) -> Result<Instrument, CoreError> {
        let instr = self
            .store
            .get_instrument(ticker)?
            .ok_or(CoreError::NotFound)?;
        if !instr.active {
            return Err(CoreError::NotFound);
        }
        Ok(instr)
    }

    /// Step 2 of spec §4.5: computes the amount to pre-reserve, dry-running
    /// the match for market orders. Returns `(reserve_instrument,
    /// reserve_amount)`.
    async fn required_reservation(
        &self,
        book: &OrderBook,
        req: &NewOrder,
    ) -> Result<(String, u64), CoreError> {
        match (req.side, req.price) {
            (Side::Sell, Some(_)) => Ok((req.instrument.clone(), req.qty)),
            (Side::Sell, None) => {
                let (fillable, _cost) = matching::dry_run(book, Side::Sell, OrderKind::Market, req.qty, None);
                if fillable < req.qty {
                    return Err(CoreError::InsufficientLiquidity);
                }
                Ok((req.instrument.clone(), req.qty))
            }
            (Side::Buy, Some(price)) => Ok((instrument::RUB.to_string(), req.qty * price)),
            (Side::Buy, None) => {
                let (fillable, cost) = matching::dry_run(book, Side::Buy, OrderKind::Market, req.qty, None);
                if fillable < req.qty {
                    return Err(CoreError::InsufficientLiquidity);
                }
                Ok((instrument::RUB.to_string(), cost))
            }
        }
    }

    /// Submits a new order through the full admission pipeline (spec
    /// §4.5 steps 1–9), returning the order as it stands once the unit
    /// of work commits.
    pub async fn submit_order(&self, req: NewOrder) -> Result<Order, CoreError> {
        self.require_active_instrument(&req.instrument)?;

        let kind = if req.price.is_some() {
            OrderKind::Limit
        } else {
            OrderKind::Market
        };

        let handle = self.book_handle(&req.instrument);
        let mut book = handle.lock().await;

        let reservation = self.required_reservation(&book, &req).await;
        let (reserve_instrument, reserve_amount) = match reservation {
            Ok(r) => r,
            Err(CoreError::InsufficientLiquidity) => {
                // Market order rejected for infeasibility before any mutation
                // (spec §4.2): it still gets a persisted CANCELLED record,
                // written alone since nothing else is part of this unit of
                // work.
                let order = Order {
                    id: Uuid::new_v4(),
                    owner: req.owner,
                    instrument: req.instrument.clone(),
                    side: req.side,
                    kind,
                    qty: req.qty,
                    price: req.price,
                    filled: 0,
                    status: OrderStatus::Cancelled,
                    created_tick: next_tick(),
                };
                self.store.insert_order(&order)?;
                return Ok(order);
            }
            Err(e) => return Err(e),
        };

        let mut pending = PendingWrites::default();

        let reserved_balance = self
            .ledger
            .reserve(req.owner, &reserve_instrument, reserve_amount)
            .await?;
        pending.touch_balance(req.owner, &reserve_instrument, reserved_balance);

        let order_id = Uuid::new_v4();
        let created_tick = next_tick();

        let outcome = matching::apply_match(&mut book, req.side, kind, req.qty, req.price);

        let mut actual_cost = 0u64;
        for fill in &outcome.fills {
            let cost = self
                .apply_fill(req.owner, order_id, &req.instrument, req.side, *fill, &mut pending)
                .await?;
            actual_cost += cost;
        }

        let filled = req.qty - outcome.residual;
        let status = if outcome.residual == 0 {
            OrderStatus::Executed
        } else if filled > 0 {
            OrderStatus::PartiallyExecuted
        } else {
            OrderStatus::New
        };

        let order = Order {
            id: order_id,
            owner: req.owner,
            instrument: req.instrument.clone(),
            side: req.side,
            kind,
            qty: req.qty,
            price: req.price,
            filled,
            status,
            created_tick,
        };
        pending.touch_order(order.clone());

        // Step 7: a limit order with residual rests in the book; its
        // reservation for the residual remains frozen as-is.
        if kind == OrderKind::Limit && outcome.residual > 0 {
            book.insert(
                req.side,
                req.price.expect("limit order always has a price"),
                OrderBookEntry {
                    order_id,
                    remaining: outcome.residual,
                    created_tick,
                },
            );
        }

        // Step 8: release any over-reservation. A BUY limit or market
        // order may have matched at better-than-reserved prices; the
        // gap between what was frozen and what was actually spent goes
        // back to available. A sell's reservation is in instrument
        // units, always consumed exactly (qty reserved == qty sold or
        // still resting), so there is never an overage to release there.
        if req.side == Side::Buy {
            let consumed = if kind == OrderKind::Market {
                actual_cost
            } else {
                actual_cost + outcome.residual * req.price.expect("limit order has a price")
            };
            if reserve_amount > consumed {
                let released = self
                    .ledger
                    .release(req.owner, &reserve_instrument, reserve_amount - consumed)
                    .await;
                pending.touch_balance(req.owner, &reserve_instrument, released);
            }
        }

        // Step 9: the taker order, every maker order touched by a fill,
        // every trade, and every balance row moved during this
        // submission commit together (spec §4.4, §8 invariant 2).
        self.store.commit(pending.into_batch()?)?;

        Ok(order)
    }

    /// Applies one matched fill's two ledger legs and stages the maker
    /// order's `filled`/status update, the resulting trade, and every
    /// touched balance row into `pending` rather than committing them
    /// directly — the whole submission commits as one unit of work (spec
    /// §4.4, §4.5 step 6). Returns the RUB cost of this leg (`price *
    /// qty`), for the taker's over-reservation release.
    async fn apply_fill(
        &self,
        taker: Uuid,
        taker_order_id: Uuid,
        ticker: &str,
        taker_side: Side,
        fill: Fill,
        pending: &mut PendingWrites,
    ) -> Result<u64, CoreError> {
        let mut maker_order = match pending.orders.get(&fill.maker_order_id) {
            Some(already_touched) => already_touched.clone(),
            None => self.store.get_order(fill.maker_order_id)?.ok_or(CoreError::NotFound)?,
        };

        let cost = fill.price * fill.qty;
        match taker_side {
            Side::Buy => {
                // taker is buyer, maker is seller: taker's frozen RUB -> maker's available RUB;
                // maker's frozen instrument units -> taker's available units.
                let (taker_rub, maker_rub) =
                    self.ledger.settle_transfer(taker, maker_order.owner, instrument::RUB, cost).await;
                pending.touch_balance(taker, instrument::RUB, taker_rub);
                pending.touch_balance(maker_order.owner, instrument::RUB, maker_rub);

                let (maker_units, taker_units) =
                    self.ledger.settle_transfer(maker_order.owner, taker, ticker, fill.qty).await;
                pending.touch_balance(maker_order.owner, ticker, maker_units);
                pending.touch_balance(taker, ticker, taker_units);
            }
            Side::Sell => {
                let (maker_rub, taker_rub) =
                    self.ledger.settle_transfer(maker_order.owner, taker, instrument::RUB, cost).await;
                pending.touch_balance(maker_order.owner, instrument::RUB, maker_rub);
                pending.touch_balance(taker, instrument::RUB, taker_rub);

                let (taker_units, maker_units) =
                    self.ledger.settle_transfer(taker, maker_order.owner, ticker, fill.qty).await;
                pending.touch_balance(taker, ticker, taker_units);
                pending.touch_balance(maker_order.owner, ticker, maker_units);
            }
        }

        maker_order.filled += fill.qty;
        maker_order.status = if maker_order.remaining() == 0 {
            OrderStatus::Executed
        } else {
            OrderStatus::PartiallyExecuted
        };
        pending.touch_order(maker_order);

        let (buy_order_id, sell_order_id) = match taker_side {
            Side::Buy => (taker_order_id, fill.maker_order_id),
            Side::Sell => (fill.maker_order_id, taker_order_id),
        };
        let trade = Trade {
            id: Uuid::new_v4(),
            buy_order_id,
            sell_order_id,
            instrument: ticker.to_string(),
            price: fill.price,
            qty: fill.qty,
            tick: next_tick(),
        };
        pending.trades.push(trade);

        Ok(cost)
    }

    /// Cancels a resting order, releasing its residual reservation (spec
    /// §4.5 "Cancellation"). `caller` must be the owner or an admin. The
    /// order update and the balance release commit together.
    ///
    /// The whole operation — re-reading the order's current status,
    /// removing it from the book, and releasing its reservation — runs
    /// under the instrument's lock, not just the book removal: two
    /// concurrent cancellations of the same order would otherwise both
    /// observe a non-terminal status before either commits and
    /// double-release the reservation (spec §5's per-instrument
    /// serialization covers ledger rows for that instrument, not only
    /// the book).
    pub async fn cancel_order(&self, caller: &User, order_id: Uuid) -> Result<Order, CoreError> {
        let instrument = self.store.get_order(order_id)?.ok_or(CoreError::NotFound)?.instrument;
        let handle = self.book_handle(&instrument);
        let mut book = handle.lock().await;

        let mut order = self.store.get_order(order_id)?.ok_or(CoreError::NotFound)?;
        if order.owner != caller.id && caller.role != Role::Admin {
            return Err(CoreError::Forbidden);
        }
        if order.status.is_terminal() {
            return Err(CoreError::InvalidState);
        }

        book.remove(order.id);

        let remaining = order.remaining();
        let (released_instrument, released_balance) = match order.side {
            Side::Sell => {
                let bal = self.ledger.release(order.owner, &order.instrument, remaining).await;
                (order.instrument.clone(), bal)
            }
            Side::Buy => {
                let price = order.price.expect("resting order always has a limit price");
                let bal = self.ledger.release(order.owner, instrument::RUB, remaining * price).await;
                (instrument::RUB.to_string(), bal)
            }
        };

        order.status = OrderStatus::Cancelled;

        let mut batch = WriteBatch::new();
        batch.stage_order(&order)?;
        batch.stage_balance(order.owner, &released_instrument, &released_balance)?;
        self.store.commit(batch)?;
        Ok(order)
    }

    /// Deactivates an instrument: cancels every resting order on it
    /// (spec §4.6). Each cancellation is its own unit of work, so a
    /// failure partway through leaves only the remaining orders open
    /// rather than corrupting what already committed.
    pub async fn deactivate_instrument(&self, admin: &User, ticker: &str) -> Result<(), CoreError> {
        let mut instr = self.store.get_instrument(ticker)?.ok_or(CoreError::NotFound)?;
        instr.active = false;
        self.store.put_instrument(&instr)?;

        for order in self.store.open_orders_for_instrument(ticker)? {
            self.cancel_order(admin, order.id).await?;
        }
        Ok(())
    }

    /// Deactivates a user: cancels every resting order they own (spec
    /// §4.6). Fails `FORBIDDEN` against an admin account, per spec §3.
    pub async fn deactivate_user(&self, admin: &User, target: Uuid) -> Result<(), CoreError> {
        let mut user = self.store.get_user(target)?.ok_or(CoreError::NotFound)?;
        if user.role == Role::Admin {
            return Err(CoreError::Forbidden);
        }
        user.active = false;
        self.store.put_user(&user)?;

        for order in self.store.open_orders_for_user(target)? {
            self.cancel_order(admin, order.id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn fresh() -> (Coordinator, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let coordinator = Coordinator::new(store);
        coordinator.store.put_instrument(&Instrument::new("TICK")).unwrap();
        (coordinator, dir)
    }

    async fn fund(c: &Coordinator, user: Uuid, ticker: &str, amount: u64) {
        c.ledger.deposit(user, ticker, amount).await;
    }

    /// Scenario 1 from spec §8: full limit match, price 40 qty 2.
    #[tokio::test]
    async fn full_limit_match_settles_both_sides() {
        let (c, _dir) = fresh().await;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        fund(&c, alice, instrument::RUB, 100).await;
        fund(&c, bob, "TICK", 2).await;

        let sell = c
            .submit_order(NewOrder {
                owner: bob,
                instrument: "TICK".into(),
                side: Side::Sell,
                qty: 2,
                price: Some(40),
            })
            .await
            .unwrap();
        assert_eq!(sell.status, OrderStatus::New);

        let buy = c
            .submit_order(NewOrder {
                owner: alice,
                instrument: "TICK".into(),
                side: Side::Buy,
                qty: 2,
                price: Some(40),
            })
            .await
            .unwrap();

        assert_eq!(buy.status, OrderStatus::Executed);
        let sell_after = c.store.get_order(sell.id).unwrap().unwrap();
        assert_eq!(sell_after.status, OrderStatus::Executed);

        assert_eq!(c.ledger.balance(alice, instrument::RUB).available, 20);
        assert_eq!(c.ledger.balance(alice, "TICK").available, 2);
        assert_eq!(c.ledger.balance(bob, instrument::RUB).available, 80);
        assert_eq!(c.ledger.balance(bob, "TICK").available, 0);
        assert_eq!(c.ledger.balance(bob, "TICK").frozen, 0);
    }

    /// Scenario 4: a market buy against an empty book is rejected before
    /// any mutation, but still produces a CANCELLED order record.
    #[tokio::test]
    async fn market_order_against_empty_book_is_cancelled_not_rejected() {
        let (c, _dir) = fresh().await;
        let buyer = Uuid::new_v4();
        fund(&c, buyer, instrument::RUB, 1000).await;

        let order = c
            .submit_order(NewOrder {
                owner: buyer,
                instrument: "TICK".into(),
                side: Side::Buy,
                qty: 1,
                price: None,
            })
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(c.ledger.balance(buyer, instrument::RUB).available, 1000);
    }

    /// Scenario 5: cancelling a resting limit order releases its full
    /// reservation.
    #[tokio::test]
    async fn cancel_releases_full_reservation() {
        let (c, _dir) = fresh().await;
        let buyer_id = Uuid::new_v4();
        fund(&c, buyer_id, instrument::RUB, 100).await;
        let buyer = User::new_user(buyer_id, "buyer", "k".repeat(64));

        let order = c
            .submit_order(NewOrder {
                owner: buyer_id,
                instrument: "TICK".into(),
                side: Side::Buy,
                qty: 2,
                price: Some(50),
            })
            .await
            .unwrap();
        assert_eq!(c.ledger.balance(buyer_id, instrument::RUB).frozen, 100);

        let cancelled = c.cancel_order(&buyer, order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(c.ledger.balance(buyer_id, instrument::RUB).available, 100);
        assert_eq!(c.ledger.balance(buyer_id, instrument::RUB).frozen, 0);
    }

    /// A buyer's market order matching at a better price than reserved
    /// (it reserves the dry-run cost itself, so no overage arises here;
    /// the overage path is exercised via a limit order matching below its
    /// own limit price instead).
    #[tokio::test]
    async fn buy_limit_matching_below_limit_price_refunds_overage() {
        let (c, _dir) = fresh().await;
        let seller = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        fund(&c, seller, "TICK", 2).await;
        fund(&c, buyer, instrument::RUB, 300).await;

        c.submit_order(NewOrder {
            owner: seller,
            instrument: "TICK".into(),
            side: Side::Sell,
            qty: 2,
            price: Some(100),
        })
        .await
        .unwrap();

        let buy = c
            .submit_order(NewOrder {
                owner: buyer,
                instrument: "TICK".into(),
                side: Side::Buy,
                qty: 2,
                price: Some(150),
            })
            .await
            .unwrap();

        assert_eq!(buy.status, OrderStatus::Executed);
        // reserved 300, spent 200 at the maker's price of 100: 100 refunded.
        assert_eq!(c.ledger.balance(buyer, instrument::RUB).available, 100);
        assert_eq!(c.ledger.balance(buyer, instrument::RUB).frozen, 0);
    }

    #[tokio::test]
    async fn deactivating_instrument_cancels_resting_orders() {
        let (c, _dir) = fresh().await;
        let admin = User {
            id: Uuid::new_v4(),
            name: "root".into(),
            api_key: "a".repeat(64),
            role: Role::Admin,
            active: true,
        };
        let seller = Uuid::new_v4();
        fund(&c, seller, "TICK", 5).await;

        let order = c
            .submit_order(NewOrder {
                owner: seller,
                instrument: "TICK".into(),
                side: Side::Sell,
                qty: 5,
                price: Some(10),
            })
            .await
            .unwrap();

        c.deactivate_instrument(&admin, "TICK").await.unwrap();

        let after = c.store.get_order(order.id).unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Cancelled);
        assert_eq!(c.ledger.balance(seller, "TICK").available, 5);
    }

    /// Spec §8 invariant 2 across a restart: a resting order's frozen
    /// reservation must still be there once the ledger is rebuilt from
    /// the store, not just held in the process that admitted it.
    #[tokio::test]
    async fn balances_survive_a_store_close_and_ledger_rehydration() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let c = Coordinator::new(store);
        c.store.put_instrument(&Instrument::new("TICK")).unwrap();
        let buyer = Uuid::new_v4();
        fund(&c, buyer, instrument::RUB, 100).await;

        c.submit_order(NewOrder {
            owner: buyer,
            instrument: "TICK".into(),
            side: Side::Buy,
            qty: 2,
            price: Some(50),
        })
        .await
        .unwrap();
        assert_eq!(c.ledger.balance(buyer, instrument::RUB).frozen, 100);

        // Reopen the same on-disk store, as a restart would, and rebuild
        // a fresh coordinator's ledger from it alone.
        drop(c);
        let reopened = Store::open(dir.path()).unwrap();
        let recovered = Coordinator::new(reopened);
        recovered.rehydrate_ledger().unwrap();

        assert_eq!(recovered.ledger.balance(buyer, instrument::RUB).frozen, 100);
        assert_eq!(recovered.ledger.balance(buyer, instrument::RUB).available, 0);
    }

    /// Spec §6 `GET /order` must list every status, not only open ones.
    #[tokio::test]
    async fn executed_and_cancelled_orders_stay_visible_in_the_by_user_index() {
        let (c, _dir) = fresh().await;
        let buyer_id = Uuid::new_v4();
        fund(&c, buyer_id, instrument::RUB, 1000).await;
        let buyer = User::new_user(buyer_id, "buyer", "k".repeat(64));

        let resting = c
            .submit_order(NewOrder {
                owner: buyer_id,
                instrument: "TICK".into(),
                side: Side::Buy,
                qty: 1,
                price: Some(10),
            })
            .await
            .unwrap();
        let cancelled = c.cancel_order(&buyer, resting.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        assert!(c.store.open_orders_for_user(buyer_id).unwrap().is_empty());
        let all = c.store.orders_for_user(buyer_id).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, OrderStatus::Cancelled);
    }

    /// A deposit made through the coordinator (not the raw ledger) must
    /// be durable across a restart.
    #[tokio::test]
    async fn coordinator_deposit_persists_through_a_restart() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let c = Coordinator::new(store);
        let user = Uuid::new_v4();

        c.deposit(user, instrument::RUB, 250).await.unwrap();
        assert_eq!(c.ledger.balance(user, instrument::RUB).available, 250);

        drop(c);
        let reopened = Store::open(dir.path()).unwrap();
        let recovered = Coordinator::new(reopened);
        recovered.rehydrate_ledger().unwrap();
        assert_eq!(recovered.ledger.balance(user, instrument::RUB).available, 250);
    }
}
