use std::future::Future;

use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use serde::Serialize;

use crate::{
    errors::AppError,
    models::{self, LedgerKind, Stock, TradeSide, Transaction, User},
    AppState,
};

use super::{activity_service, coin_service, coin_service::CENT_TOLERANCE, stock_service};

#[derive(Debug, Clone, Serialize)]
pub struct TradeResult {
    pub side: TradeSide,
    pub symbol: String,
    pub qty: i64,
    pub fill_price: f64,
    pub total: f64,
    pub new_coins: f64,
    pub holding: i64,
}

/// What the trade panel shows for one stock.
#[derive(Debug, Clone, Serialize)]
pub struct TradeView {
    pub stock: Stock,
    pub coins: f64,
    pub holding: i64,
    pub max_affordable: i64,
}

fn holding_key(symbol: &str) -> String {
    format!("owned_stocks.{symbol}")
}

/// Cost of `qty` shares, in cents precision.
pub fn order_total(price: f64, qty: i64) -> f64 {
    models::round2(price * qty as f64)
}

pub fn validate_order(symbol: &str, qty: i64) -> Result<String, AppError> {
    let sym = stock_service::normalize_symbol(symbol);
    if sym.is_empty() {
        return Err(AppError::field("symbol", "Missing symbol."));
    }
    if qty <= 0 {
        return Err(AppError::field("qty", "Enter a valid quantity."));
    }
    Ok(sym)
}

/// How many shares `coins` buys at `price`, capped by what's available.
/// Uses the same cent-precision comparison as the buy guard.
pub fn max_affordable(coins: f64, price: f64, available: i64) -> i64 {
    if !(price > 0.0) || !(coins > 0.0) {
        return 0;
    }
    let budget = models::round2(coins) + CENT_TOLERANCE;
    let mut n = (budget / price).floor() as i64;
    while n > 0 && order_total(price, n) > budget {
        n -= 1;
    }
    n.min(available).max(0)
}

/// Takes `qty` shares out of the pool while enough remain.
pub fn reserve_shares(stock_id: ObjectId, qty: i64) -> (Document, Document) {
    (
        doc! { "_id": stock_id, "available_shares": { "$gte": qty } },
        doc! { "$inc": { "available_shares": -qty } },
    )
}

pub fn return_shares(stock_id: ObjectId, qty: i64) -> (Document, Document) {
    (
        doc! { "_id": stock_id },
        doc! { "$inc": { "available_shares": qty } },
    )
}

/// Pays `cost` and takes delivery of `qty` shares in one guarded write.
pub fn buy_debit(user_id: ObjectId, symbol: &str, qty: i64, cost: f64) -> (Document, Vec<Document>) {
    let key = holding_key(symbol);
    let path = format!("${key}");

    let mut holding = Document::new();
    holding.insert(key, doc! { "$add": [{ "$ifNull": [path.as_str(), 0i64] }, qty] });

    (
        coin_service::covers_filter(user_id, cost),
        coin_service::balance_update(-cost, holding),
    )
}

/// Hands over `qty` shares and credits `proceeds`, only while the holding covers `qty`.
pub fn sell_credit(user_id: ObjectId, symbol: &str, qty: i64, proceeds: f64) -> (Document, Vec<Document>) {
    let key = holding_key(symbol);
    let path = format!("${key}");

    let mut filter = doc! { "_id": user_id };
    filter.insert(key.clone(), doc! { "$gte": qty });

    let mut holding = Document::new();
    holding.insert(key, doc! { "$subtract": [path.as_str(), qty] });

    (filter, coin_service::balance_update(proceeds, holding))
}

/// Removes a holding that reached 0. Matches only while it is still 0, so a
/// buy landing in between keeps its shares.
pub fn drop_empty_holding(user_id: ObjectId, symbol: &str) -> (Document, Document) {
    let key = holding_key(symbol);

    let mut filter = doc! { "_id": user_id };
    filter.insert(key.clone(), 0i64);
    let mut unset = Document::new();
    unset.insert(key, "");

    (filter, doc! { "$unset": unset })
}

/// Resolves the guarded debit of a buy. Unless it matched a user, the
/// reserved shares go back through `release`.
pub async fn settle_buy<F, Fut>(
    debited: Result<Option<User>, mongodb::error::Error>,
    release: F,
) -> Result<User, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    match debited {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            release().await;
            Err(AppError::field("balance", "Not enough coins."))
        }
        Err(e) => {
            release().await;
            Err(e.into())
        }
    }
}

async fn load_stock(state: &AppState, sym: &str) -> Result<Stock, AppError> {
    stock_service::get_by_symbol(state, sym)
        .await?
        .ok_or_else(|| AppError::field("symbol", "Unknown stock."))
}

pub async fn get_trade_view(state: &AppState, user_id: ObjectId, symbol: &str) -> Result<TradeView, AppError> {
    let stock = stock_service::get_by_symbol(state, symbol)
        .await?
        .ok_or(AppError::NotFound("Unknown stock."))?;

    let users = state.db.collection::<User>(models::USERS);
    let user = users
        .find_one(doc! { "_id": user_id }, None)
        .await?
        .ok_or(AppError::NotFound("User not found."))?;

    Ok(TradeView {
        max_affordable: max_affordable(user.coins, stock.price, stock.available_shares),
        coins: user.coins,
        holding: user.holding(&stock.symbol),
        stock,
    })
}

async fn append_transaction(state: &AppState, user_id: ObjectId, stock: &Stock, side: TradeSide, qty: i64, now: i64) {
    let tx = Transaction {
        id: ObjectId::new(),
        user_id,
        stock_symbol: stock.symbol.clone(),
        stock_name: stock.name.clone(),
        price: stock.price,
        quantity: qty,
        side,
        timestamp: now,
    };
    let col = state.db.collection::<Transaction>(models::TRANSACTIONS);
    if let Err(e) = col.insert_one(&tx, None).await {
        tracing::error!(error = %e, user = %user_id, symbol = %stock.symbol, "trade applied but transaction log write failed");
    }
}

fn after() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

pub async fn market_buy(state: &AppState, user_id: ObjectId, symbol: &str, qty: i64) -> Result<TradeResult, AppError> {
    let sym = validate_order(symbol, qty)?;
    let stock = load_stock(state, &sym).await?;

    if qty > stock.available_shares {
        return Err(AppError::field("qty", "Not enough shares available."));
    }

    let cost = order_total(stock.price, qty);
    let stocks = state.db.collection::<Stock>(models::STOCKS);
    let users = state.db.collection::<User>(models::USERS);

    let (filter, update) = reserve_shares(stock.id, qty);
    let reserved = stocks.update_one(filter, update, None).await?;
    if reserved.matched_count == 0 {
        return Err(AppError::field("qty", "Not enough shares available."));
    }

    let (filter, update) = buy_debit(user_id, &sym, qty, cost);
    let debited = users.find_one_and_update(filter, update, after()).await;

    let (pool, stock_id, held_sym) = (&stocks, stock.id, sym.as_str());
    let user = settle_buy(debited, move || async move {
        let (filter, update) = return_shares(stock_id, qty);
        if let Err(e) = pool.update_one(filter, update, None).await {
            tracing::error!(error = %e, symbol = %held_sym, qty, "failed to release reserved shares");
        }
    })
    .await?;

    let now = Utc::now().timestamp();
    append_transaction(state, user_id, &stock, TradeSide::Buy, qty, now).await;
    coin_service::record_coin_transaction(state, user_id, LedgerKind::Debit, cost, user.coins, &format!("Bought {qty} {sym}")).await;
    activity_service::log_activity(state, user_id, format!("Bought {qty} {sym} @ {:.2}", stock.price)).await;

    state.broadcast(&["coinsUpdated", "holdingsUpdated", "transactionsUpdated", "stocksUpdated"]);
    tracing::info!(user = %user_id, symbol = %sym, qty, price = stock.price, "buy filled");

    Ok(TradeResult {
        side: TradeSide::Buy,
        holding: user.holding(&sym),
        symbol: sym,
        qty,
        fill_price: stock.price,
        total: cost,
        new_coins: user.coins,
    })
}

pub async fn market_sell(state: &AppState, user_id: ObjectId, symbol: &str, qty: i64) -> Result<TradeResult, AppError> {
    let sym = validate_order(symbol, qty)?;
    let stock = load_stock(state, &sym).await?;

    let proceeds = order_total(stock.price, qty);
    let stocks = state.db.collection::<Stock>(models::STOCKS);
    let users = state.db.collection::<User>(models::USERS);

    let (filter, update) = sell_credit(user_id, &sym, qty, proceeds);
    let user = users
        .find_one_and_update(filter, update, after())
        .await?
        .ok_or_else(|| AppError::field("qty", "Not enough shares to sell."))?;

    let (filter, update) = return_shares(stock.id, qty);
    if let Err(e) = stocks.update_one(filter, update, None).await {
        tracing::error!(error = %e, symbol = %sym, qty, "sold shares not returned to the pool");
    }

    let remaining = user.holding(&sym);
    if remaining == 0 {
        let (filter, update) = drop_empty_holding(user_id, &sym);
        if let Err(e) = users.update_one(filter, update, None).await {
            tracing::warn!(error = %e, symbol = %sym, "failed to drop empty holding");
        }
    }

    let now = Utc::now().timestamp();
    append_transaction(state, user_id, &stock, TradeSide::Sell, qty, now).await;
    coin_service::record_coin_transaction(state, user_id, LedgerKind::Credit, proceeds, user.coins, &format!("Sold {qty} {sym}")).await;
    activity_service::log_activity(state, user_id, format!("Sold {qty} {sym} @ {:.2}", stock.price)).await;

    state.broadcast(&["coinsUpdated", "holdingsUpdated", "transactionsUpdated", "stocksUpdated"]);
    tracing::info!(user = %user_id, symbol = %sym, qty, price = stock.price, "sell filled");

    Ok(TradeResult {
        side: TradeSide::Sell,
        symbol: sym,
        qty,
        fill_price: stock.price,
        total: proceeds,
        new_coins: user.coins,
        holding: remaining,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn order_validation() {
        assert_eq!(validate_order(" acme ", 3).unwrap(), "ACME");

        let e = validate_order("  ", 3).unwrap_err();
        assert_eq!(e.field_errors().get("symbol").map(String::as_str), Some("Missing symbol."));

        for q in [0, -1] {
            let e = validate_order("ACME", q).unwrap_err();
            assert_eq!(e.field_errors().get("qty").map(String::as_str), Some("Enter a valid quantity."));
        }
    }

    #[test]
    fn totals_round_to_cents() {
        assert_eq!(order_total(10.333, 3), 31.0);
        assert_eq!(order_total(0.1, 3), 0.3);
        assert_eq!(order_total(250.0, 4), 1000.0);
    }

    #[test]
    fn affordable_is_capped_by_coins_and_supply() {
        assert_eq!(max_affordable(1000.0, 30.0, 100), 33);
        assert_eq!(max_affordable(1000.0, 30.0, 10), 10);
        assert_eq!(max_affordable(0.0, 30.0, 10), 0);
        assert_eq!(max_affordable(1000.0, 0.0, 10), 0);
        assert_eq!(max_affordable(1000.0, f64::NAN, 10), 0);
    }

    #[test]
    fn affordable_counts_whole_cents() {
        // 0.3 / 0.1 is just under 3 in floating point
        assert_eq!(max_affordable(0.30, 0.10, 100), 3);
        assert_eq!(max_affordable(0.30_f64 - 0.10, 0.10, 100), 2);
        assert_eq!(max_affordable(0.29, 0.10, 100), 2);
    }

    #[test]
    fn buy_after_drift_still_covers_displayed_balance() {
        let id = ObjectId::new();
        // what the rounded pipeline stores after 0.30 - 0.10
        let stored = models::round2(0.30 + -order_total(0.10, 1));
        assert_eq!(stored, 0.2);

        let (filter, _) = buy_debit(id, "ACME", 2, order_total(0.10, 2));
        let min = filter.get_document("coins").unwrap().get_f64("$gte").unwrap();
        assert!(stored >= min);
        assert!(0.30_f64 - 0.10 >= min);
    }

    #[test]
    fn reservation_requires_enough_shares() {
        let id = ObjectId::new();
        let (filter, update) = reserve_shares(id, 5);
        assert_eq!(filter, doc! { "_id": id, "available_shares": { "$gte": 5i64 } });
        assert_eq!(update, doc! { "$inc": { "available_shares": -5i64 } });

        let (filter, update) = return_shares(id, 5);
        assert_eq!(filter, doc! { "_id": id });
        assert_eq!(update, doc! { "$inc": { "available_shares": 5i64 } });
    }

    #[test]
    fn buy_debit_charges_and_delivers_in_one_stage() {
        let id = ObjectId::new();
        let (filter, update) = buy_debit(id, "ACME", 3, 31.0);

        assert_eq!(filter.get_object_id("_id").unwrap(), id);
        assert_eq!(filter.get_document("coins").unwrap().get_f64("$gte").unwrap(), 31.0 - CENT_TOLERANCE);

        assert_eq!(update.len(), 1);
        let set = update[0].get_document("$set").unwrap();
        assert_eq!(
            set.get_document("coins").unwrap(),
            &doc! { "$round": [{ "$add": ["$coins", -31.0] }, 2] }
        );
        assert_eq!(
            set.get_document("owned_stocks.ACME").unwrap(),
            &doc! { "$add": [{ "$ifNull": ["$owned_stocks.ACME", 0i64] }, 3i64] }
        );
    }

    #[test]
    fn sell_credit_requires_the_holding() {
        let id = ObjectId::new();
        let (filter, update) = sell_credit(id, "ACME", 4, 50.0);

        assert_eq!(filter, doc! { "_id": id, "owned_stocks.ACME": { "$gte": 4i64 } });
        let set = update[0].get_document("$set").unwrap();
        assert_eq!(
            set.get_document("coins").unwrap(),
            &doc! { "$round": [{ "$add": ["$coins", 50.0] }, 2] }
        );
        assert_eq!(
            set.get_document("owned_stocks.ACME").unwrap(),
            &doc! { "$subtract": ["$owned_stocks.ACME", 4i64] }
        );
    }

    #[test]
    fn empty_holding_is_dropped_only_while_zero() {
        let id = ObjectId::new();
        let (filter, update) = drop_empty_holding(id, "ACME");
        assert_eq!(filter, doc! { "_id": id, "owned_stocks.ACME": 0i64 });
        assert_eq!(update, doc! { "$unset": { "owned_stocks.ACME": "" } });
    }

    fn user(coins: f64) -> User {
        User {
            id: ObjectId::new(),
            name: "Trader".into(),
            email: "trader@example.com".into(),
            password_hash: String::new(),
            role: models::Role::User,
            coins,
            owned_stocks: HashMap::new(),
            created_at: 0,
            last_login: None,
        }
    }

    #[tokio::test]
    async fn matched_debit_keeps_the_reservation() {
        let released = AtomicUsize::new(0);
        let counter = &released;

        let u = settle_buy(Ok(Some(user(69.0))), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert_eq!(u.coins, 69.0);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmatched_debit_releases_shares_once() {
        let released = AtomicUsize::new(0);
        let counter = &released;

        let err = settle_buy(Ok(None), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap_err();

        assert_eq!(err.field_errors().get("balance").map(String::as_str), Some("Not enough coins."));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
