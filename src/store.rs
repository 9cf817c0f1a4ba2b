//! The persistent Order Store (spec §4.4): orders, trades, instruments,
//! users and balances, backed by `parity-db` with `bincode`-encoded
//! values, generalizing the teacher's trade-only store to the full data
//! model while keeping its key-layout and cursor-pagination idiom.
//!
//! Column layout:
//! - 0 `trades`            — key `{ticker}:` + tick(u64) + id(u128), ordered scan per instrument
//! - 1 `orders`            — key order-id(u128), the single source of truth for an order
//! - 2 `open_orders_by_user`       — key user-id(u128) + tick(u64) + order-id(u128) -> order-id, removed once terminal
//! - 3 `open_orders_by_instrument` — key `{ticker}:` + tick(u64) + order-id(u128) -> order-id, removed once terminal
//! - 4 `instruments`       — key ticker bytes
//! - 5 `users`             — key user-id(u128)
//! - 6 `users_by_api_key`  — key api-key bytes -> user-id(u128)
//! - 7 `balances`          — key user-id(u128) + `:` + ticker bytes, the
//!   recovery source of truth for the ledger (spec §4.4, §6 "Persisted
//!   state")
//! - 8 `orders_by_user`    — key user-id(u128) + tick(u64) + order-id(u128)
//!   -> order-id, permanent (never removed on a terminal transition), so
//!   a caller's full order history is always reachable by this index even
//!   after execution or cancellation (spec §6 "list caller's orders")
//!
//! [`WriteBatch`] lets a caller stage order/trade/balance writes spanning
//! several columns and commit them with a single `db.commit(...)` call.
//! `parity-db` applies a commit atomically, which is how the "all
//! mutations in a unit of work commit or none do" requirement of spec
//! §4.4 is realized without a separate transaction object — the
//! coordinator uses this to fold an entire order submission's order,
//! trade and balance writes into one commit (spec §4.4, §8 invariant 2).
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use bincode::{
    config::{self, standard},
    error::{DecodeError, EncodeError},
};
use parity_db::{BTreeIterator, ColId, Db, Options};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    instrument::Instrument,
    ledger::Balance,
    orders::Order,
    trade::Trade,
    user::User,
};

const COL_TRADES: ColId = 0;
const COL_ORDERS: ColId = 1;
const COL_OPEN_BY_USER: ColId = 2;
const COL_OPEN_BY_INSTRUMENT: ColId = 3;
const COL_INSTRUMENTS: ColId = 4;
const COL_USERS: ColId = 5;
const COL_USERS_BY_API_KEY: ColId = 6;
const COL_BALANCES: ColId = 7;
const COL_ORDERS_BY_USER: ColId = 8;
const NUM_COLS: u8 = 9;

type RawOp = (ColId, Vec<u8>, Option<Vec<u8>>);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("parity-db error: {0}")]
    Parity(#[from] parity_db::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),
    #[error("bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),
    #[error("invalid cursor")]
    BadCursor,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(serde::Serialize, serde::Deserialize)]
struct Cursor {
    v: u8,
    tick: u64,
    id: u128,
}

/// A unit of work: raw column writes staged by the caller and applied in
/// one atomic `db.commit` (spec §4.4). Built via [`WriteBatch::new`] and
/// the `stage_*` helpers, then handed to [`Store::commit`].
#[derive(Default)]
pub struct WriteBatch {
    ops: Vec<RawOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an order's row plus its open-by-user/open-by-instrument
    /// index entries (present while non-terminal, tombstoned once
    /// terminal) and its permanent by-user index entry (spec §6 "list
    /// caller's orders" — never tombstoned, so a terminal order stays
    /// reachable through it).
    pub fn stage_order(&mut self, order: &Order) -> StoreResult<()> {
        let key = order.id.as_u128().to_be_bytes().to_vec();
        let value = Store::encode(order)?;
        self.ops.push((COL_ORDERS, key, Some(value)));

        let (by_user, by_instrument) = Store::order_open_index_keys(order);
        let id_bytes = order.id.as_u128().to_be_bytes().to_vec();
        if order.status.is_terminal() {
            self.ops.push((COL_OPEN_BY_USER, by_user, None));
            self.ops.push((COL_OPEN_BY_INSTRUMENT, by_instrument, None));
        } else {
            self.ops.push((COL_OPEN_BY_USER, by_user, Some(id_bytes.clone())));
            self.ops.push((COL_OPEN_BY_INSTRUMENT, by_instrument, Some(id_bytes.clone())));
        }

        let all_by_user = Store::all_by_user_index_key(order);
        self.ops.push((COL_ORDERS_BY_USER, all_by_user, Some(id_bytes)));
        Ok(())
    }

    pub fn stage_trade(&mut self, trade: &Trade) -> StoreResult<()> {
        let key = Store::trade_key(trade);
        let value = Store::encode(trade)?;
        self.ops.push((COL_TRADES, key, Some(value)));
        Ok(())
    }

    /// Stages a balance snapshot row — the recovery source of truth the
    /// ledger is rehydrated from at startup (spec §4.4, §6).
    pub fn stage_balance(&mut self, user: Uuid, instrument: &str, balance: &Balance) -> StoreResult<()> {
        let key = Store::balance_key(user, instrument);
        let value = Store::encode(balance)?;
        self.ops.push((COL_BALANCES, key, Some(value)));
        Ok(())
    }

    pub fn stage_instrument(&mut self, instrument: &Instrument) -> StoreResult<()> {
        let key = instrument.ticker.as_bytes().to_vec();
        let value = Store::encode(instrument)?;
        self.ops.push((COL_INSTRUMENTS, key, Some(value)));
        Ok(())
    }

    pub fn stage_user(&mut self, user: &User) -> StoreResult<()> {
        let key = user.id.as_u128().to_be_bytes().to_vec();
        let value = Store::encode(user)?;
        self.ops.push((COL_USERS, key, Some(value)));
        self.ops.push((COL_USERS_BY_API_KEY, user.api_key.as_bytes().to_vec(), Some(key)));
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A `parity-db`-backed store for the full order-book data model.
pub struct Store {
    db: Db,
}

impl Store {
    /// Opens (or creates) a store at `path` with one btree-indexed
    /// column per table.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), NUM_COLS);
        for col in opts.columns.iter_mut() {
            col.btree_index = true;
        }
        let db = Db::open_or_create(&opts)?;
        Ok(Store { db })
    }

    /// Applies a [`WriteBatch`] as a single atomic `db.commit`, the
    /// primitive spec §4.4's "all commit or all rollback" unit of work
    /// is built on. A no-op batch skips the call entirely.
    pub fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.db.commit(batch.ops)?;
        Ok(())
    }

    // Every value type here derives `serde::{Serialize, Deserialize}` but
    // not bincode's own `Encode`/`Decode` (those would additionally need
    // to special-case `Uuid`); bincode's `serde` compatibility layer
    // bridges the two, giving the same compact binary encoding the
    // teacher's `Trade`-only store used.
    fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(value, config::standard())?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
        let (value, _) = bincode::serde::decode_from_slice(bytes, standard())?;
        Ok(value)
    }

    // ---- trades -----------------------------------------------------

    fn trades_prefix(ticker: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(ticker.len() + 1);
        k.extend_from_slice(ticker.as_bytes());
        k.push(b':');
        k
    }

    fn trade_key(trade: &Trade) -> Vec<u8> {
        let mut key = Self::trades_prefix(&trade.instrument);
        key.extend_from_slice(&trade.tick.to_be_bytes());
        key.extend_from_slice(&trade.id.as_u128().to_be_bytes());
        key
    }

    /// Inserts a trade row under the instrument-prefixed, tick-ordered key.
    pub fn insert_trade(&self, trade: &Trade) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.stage_trade(trade)?;
        self.commit(batch)
    }

    /// Pages forward (ascending tick) through a ticker's trades,
    /// starting strictly after `after`. Returns `(items, next_cursor)`;
    /// `next_cursor` is `Some` only if another record exists beyond the
    /// returned page (look-ahead pagination), and is rejected with
    /// [`StoreError::BadCursor`] if it doesn't correspond to a real key
    /// under this ticker's prefix.
    pub fn page_trades_asc(
        &self,
        ticker: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<(Vec<Trade>, Option<String>)> {
        let mut it: BTreeIterator<'_> = self.db.iter(COL_TRADES)?;
        let prefix = Self::trades_prefix(ticker);

        match after {
            None => {
                it.seek(&prefix)?;
            }
            Some(s) => {
                let cursor = Self::decode_cursor(s)?;
                let mut key = prefix.clone();
                key.extend_from_slice(&cursor.tick.to_be_bytes());
                key.extend_from_slice(&cursor.id.to_be_bytes());
                it.seek(&key)?;
                match it.next()? {
                    Some((k, _)) if k == key => {}
                    _ => return Err(StoreError::BadCursor),
                }
            }
        }

        let mut items = Vec::with_capacity(limit.min(256));
        let mut next_cursor = None;
        let mut read = 0usize;
        while read < limit + 1 {
            match it.next()? {
                Some((k, v)) if k.starts_with(&prefix) => {
                    let trade: Trade = Self::decode(&v)?;
                    if items.len() < limit {
                        next_cursor = Some(Self::encode_cursor(&Cursor {
                            v: 1,
                            tick: trade.tick,
                            id: trade.id.as_u128(),
                        }));
                        items.push(trade);
                    }
                    read += 1;
                }
                _ => break,
            }
        }

        let next = if read > limit && !items.is_empty() {
            next_cursor
        } else {
            None
        };
        Ok((items, next))
    }

    fn encode_cursor(c: &Cursor) -> String {
        B64.encode(serde_json::to_vec(c).expect("cursor serializes"))
    }

    fn decode_cursor(s: &str) -> StoreResult<Cursor> {
        let bytes = B64.decode(s).map_err(|_| StoreError::BadCursor)?;
        let c: Cursor = serde_json::from_slice(&bytes).map_err(|_| StoreError::BadCursor)?;
        if c.v != 1 {
            return Err(StoreError::BadCursor);
        }
        Ok(c)
    }

    // ---- orders -------------------------------------------------------

    fn order_open_index_keys(order: &Order) -> (Vec<u8>, Vec<u8>) {
        let mut by_user = order.owner.as_u128().to_be_bytes().to_vec();
        by_user.extend_from_slice(&order.created_tick.to_be_bytes());
        by_user.extend_from_slice(&order.id.as_u128().to_be_bytes());

        let mut by_instrument = Self::trades_prefix(&order.instrument);
        by_instrument.extend_from_slice(&order.created_tick.to_be_bytes());
        by_instrument.extend_from_slice(&order.id.as_u128().to_be_bytes());

        (by_user, by_instrument)
    }

    fn all_by_user_index_key(order: &Order) -> Vec<u8> {
        let mut key = order.owner.as_u128().to_be_bytes().to_vec();
        key.extend_from_slice(&order.created_tick.to_be_bytes());
        key.extend_from_slice(&order.id.as_u128().to_be_bytes());
        key
    }

    /// Inserts a newly-admitted order, indexing it under both the owner
    /// and the instrument if it starts life non-terminal (every order
    /// does, except a rejected market order), plus the permanent
    /// by-user index.
    pub fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.stage_order(order)?;
        self.commit(batch)
    }

    /// Writes an order's current state back, removing it from the open
    /// indexes once it reaches a terminal status. `created_tick` never
    /// changes after creation, so the index *keys* are stable across
    /// calls — only their presence changes. The permanent by-user index
    /// is untouched by terminal transitions.
    pub fn update_order(&self, order: &Order) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.stage_order(order)?;
        self.commit(batch)
    }

    pub fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let key = id.as_u128().to_be_bytes().to_vec();
        match self.db.get(COL_ORDERS, &key)? {
            Some(v) => Ok(Some(Self::decode(&v)?)),
            None => Ok(None),
        }
    }

    fn scan_order_ids(&self, col: ColId, prefix: &[u8]) -> StoreResult<Vec<Uuid>> {
        let mut it = self.db.iter(col)?;
        it.seek(prefix)?;
        let mut ids = Vec::new();
        while let Some((k, v)) = it.next()? {
            if !k.starts_with(prefix) {
                break;
            }
            let raw: [u8; 16] = v.as_slice().try_into().map_err(|_| StoreError::BadCursor)?;
            ids.push(Uuid::from_u128(u128::from_be_bytes(raw)));
        }
        Ok(ids)
    }

    /// Enumerates open (`New`/`PartiallyExecuted`) order ids for a user,
    /// for account deactivation (spec §4.6).
    pub fn open_orders_for_user(&self, user: Uuid) -> StoreResult<Vec<Order>> {
        let prefix = user.as_u128().to_be_bytes().to_vec();
        let ids = self.scan_order_ids(COL_OPEN_BY_USER, &prefix)?;
        ids.into_iter()
            .filter_map(|id| self.get_order(id).transpose())
            .collect()
    }

    /// Enumerates open order ids for an instrument, for instrument
    /// deactivation (spec §4.6).
    pub fn open_orders_for_instrument(&self, ticker: &str) -> StoreResult<Vec<Order>> {
        let prefix = Self::trades_prefix(ticker);
        let ids = self.scan_order_ids(COL_OPEN_BY_INSTRUMENT, &prefix)?;
        ids.into_iter()
            .filter_map(|id| self.get_order(id).transpose())
            .collect()
    }

    /// Enumerates every order a user has ever placed, any status, via
    /// the permanent by-user index — the listing spec §6's `GET /order`
    /// ("list caller's orders") requires, distinct from
    /// [`Store::open_orders_for_user`]'s open-only view.
    pub fn orders_for_user(&self, user: Uuid) -> StoreResult<Vec<Order>> {
        let prefix = user.as_u128().to_be_bytes().to_vec();
        let ids = self.scan_order_ids(COL_ORDERS_BY_USER, &prefix)?;
        ids.into_iter()
            .filter_map(|id| self.get_order(id).transpose())
            .collect()
    }

    // ---- instruments --------------------------------------------------

    pub fn put_instrument(&self, instrument: &Instrument) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.stage_instrument(instrument)?;
        self.commit(batch)
    }

    pub fn get_instrument(&self, ticker: &str) -> StoreResult<Option<Instrument>> {
        match self.db.get(COL_INSTRUMENTS, ticker.as_bytes())? {
            Some(v) => Ok(Some(Self::decode(&v)?)),
            None => Ok(None),
        }
    }

    pub fn list_instruments(&self) -> StoreResult<Vec<Instrument>> {
        let mut it = self.db.iter(COL_INSTRUMENTS)?;
        it.seek_to_first()?;
        let mut out = Vec::new();
        while let Some((_, v)) = it.next()? {
            out.push(Self::decode(&v)?);
        }
        Ok(out)
    }

    // ---- users ----------------------------------------------------------

    pub fn put_user(&self, user: &User) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.stage_user(user)?;
        self.commit(batch)
    }

    pub fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let key = id.as_u128().to_be_bytes().to_vec();
        match self.db.get(COL_USERS, &key)? {
            Some(v) => Ok(Some(Self::decode(&v)?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_api_key(&self, api_key: &str) -> StoreResult<Option<User>> {
        let Some(id_bytes) = self.db.get(COL_USERS_BY_API_KEY, api_key.as_bytes())? else {
            return Ok(None);
        };
        let raw: [u8; 16] = id_bytes.as_slice().try_into().map_err(|_| StoreError::BadCursor)?;
        self.get_user(Uuid::from_u128(u128::from_be_bytes(raw)))
    }

    // ---- balances (persisted, the ledger's recovery source) ------------

    fn balance_key(user: Uuid, instrument: &str) -> Vec<u8> {
        let mut key = user.as_u128().to_be_bytes().to_vec();
        key.push(b':');
        key.extend_from_slice(instrument.as_bytes());
        key
    }

    pub fn put_balance(&self, user: Uuid, instrument: &str, balance: &Balance) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.stage_balance(user, instrument, balance)?;
        self.commit(batch)
    }

    pub fn get_balance(&self, user: Uuid, instrument: &str) -> StoreResult<Option<Balance>> {
        let key = Self::balance_key(user, instrument);
        match self.db.get(COL_BALANCES, &key)? {
            Some(v) => Ok(Some(Self::decode(&v)?)),
            None => Ok(None),
        }
    }

    /// The highest tick persisted across every order and trade row, for
    /// reseeding the in-process tick counter at startup (spec §4.4 — the
    /// tick is part of the persisted "source of truth for recovery", not
    /// merely an in-process disambiguator). Returns 0 for a fresh store.
    pub fn max_tick(&self) -> StoreResult<u64> {
        let mut max = 0u64;

        let mut orders_it = self.db.iter(COL_ORDERS)?;
        orders_it.seek_to_first()?;
        while let Some((_, v)) = orders_it.next()? {
            let order: Order = Self::decode(&v)?;
            max = max.max(order.created_tick);
        }

        let mut trades_it = self.db.iter(COL_TRADES)?;
        trades_it.seek_to_first()?;
        while let Some((_, v)) = trades_it.next()? {
            let trade: Trade = Self::decode(&v)?;
            max = max.max(trade.tick);
        }

        Ok(max)
    }

    /// Every persisted balance row, for ledger rehydration at startup
    /// (spec §4.4 "source of truth for recovery").
    pub fn list_balances(&self) -> StoreResult<Vec<(Uuid, String, Balance)>> {
        let mut it = self.db.iter(COL_BALANCES)?;
        it.seek_to_first()?;
        let mut out = Vec::new();
        while let Some((k, v)) = it.next()? {
            if k.len() < 17 {
                continue;
            }
            let raw: [u8; 16] = k[..16].try_into().map_err(|_| StoreError::BadCursor)?;
            let user = Uuid::from_u128(u128::from_be_bytes(raw));
            let instrument = String::from_utf8_lossy(&k[17..]).into_owned();
            let balance: Balance = Self::decode(&v)?;
            out.push((user, instrument, balance));
        }
        Ok(out)
    }
}
