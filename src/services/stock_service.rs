use std::sync::OnceLock;

use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::FindOptions;
use regex::Regex;

use crate::{
    errors::AppError,
    models::{self, Stock},
    AppState,
};

fn symbol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // symbols become field names under users.owned_stocks, so no dots or `$`
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9]{1,10}$").expect("valid symbol regex"))
}

pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn is_valid_symbol(symbol: &str) -> bool {
    symbol_re().is_match(symbol)
}

/// Raw form values for creating or editing a stock.
#[derive(Debug, Clone, Default)]
pub struct StockInput {
    pub symbol: String,
    pub name: String,
    pub price: String,
    pub available_shares: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidStock {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub available_shares: i64,
}

pub fn validate_stock(input: &StockInput, check_symbol: bool) -> Result<ValidStock, AppError> {
    let symbol = normalize_symbol(&input.symbol);
    if check_symbol && !is_valid_symbol(&symbol) {
        return Err(AppError::field("symbol", "Symbol must be 1-10 letters or digits."));
    }

    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::field("name", "Name is required."));
    }

    let price = match input.price.trim().parse::<f64>() {
        Ok(p) if p.is_finite() && p > 0.0 => models::round2(p),
        _ => return Err(AppError::field("price", "Price must be a positive number.")),
    };

    let available_shares = match input.available_shares.trim().parse::<i64>() {
        Ok(n) if n >= 0 => n,
        _ => return Err(AppError::field("available_shares", "Available shares must be zero or more.")),
    };

    Ok(ValidStock { symbol, name, price, available_shares })
}

pub async fn list_stocks(state: &AppState) -> Result<Vec<Stock>, AppError> {
    let stocks = state.db.collection::<Stock>(models::STOCKS);
    let find_opts = FindOptions::builder().sort(doc! { "symbol": 1 }).build();
    let mut cursor = stocks.find(doc! {}, find_opts).await?;

    let mut out = vec![];
    while let Some(res) = cursor.next().await {
        out.push(res?);
    }
    Ok(out)
}

pub async fn get_by_symbol(state: &AppState, symbol: &str) -> Result<Option<Stock>, AppError> {
    let sym = normalize_symbol(symbol);
    let stocks = state.db.collection::<Stock>(models::STOCKS);
    Ok(stocks.find_one(doc! { "symbol": sym }, None).await?)
}

pub async fn create_stock(state: &AppState, input: &StockInput) -> Result<Stock, AppError> {
    let v = validate_stock(input, true)?;

    let stock = Stock {
        id: ObjectId::new(),
        symbol: v.symbol,
        name: v.name,
        price: v.price,
        available_shares: v.available_shares,
        last_updated: Utc::now().timestamp(),
    };

    let stocks = state.db.collection::<Stock>(models::STOCKS);
    if let Err(e) = stocks.insert_one(&stock, None).await {
        let err = AppError::from(e);
        if err.is_duplicate_key() {
            return Err(AppError::field("symbol", "A stock with this symbol already exists."));
        }
        return Err(err);
    }

    state.broadcast(&["stocksUpdated"]);
    tracing::info!(symbol = %stock.symbol, price = stock.price, "stock created");
    Ok(stock)
}

/// Filter and update for a stock edit. The filter pins the share count the
/// admin saw, so shares a buy reserves in between are not handed back.
pub fn stock_edit_update(id: ObjectId, seen_shares: i64, v: &ValidStock, now: i64) -> (Document, Document) {
    (
        doc! { "_id": id, "available_shares": seen_shares },
        doc! { "$set": {
            "name": &v.name,
            "price": v.price,
            "available_shares": v.available_shares,
            "last_updated": now,
        } },
    )
}

/// Edits name, price and share count. The symbol stays fixed because
/// holdings are keyed by it.
pub async fn update_stock(state: &AppState, id: &str, input: &StockInput) -> Result<(), AppError> {
    let oid = ObjectId::parse_str(id).map_err(|_| AppError::NotFound("Stock not found."))?;
    let v = validate_stock(input, false)?;

    let stocks = state.db.collection::<Stock>(models::STOCKS);
    let before = stocks
        .find_one(doc! { "_id": oid }, None)
        .await?
        .ok_or(AppError::NotFound("Stock not found."))?;

    let (filter, update) = stock_edit_update(oid, before.available_shares, &v, Utc::now().timestamp());
    let res = stocks.update_one(filter, update, None).await?;

    if res.matched_count == 0 {
        return match stocks.find_one(doc! { "_id": oid }, None).await? {
            Some(_) => Err(AppError::form("Shares changed, reload and try again.")),
            None => Err(AppError::NotFound("Stock not found.")),
        };
    }

    state.broadcast(&["stocksUpdated"]);
    tracing::info!(stock = %oid, price = v.price, "stock updated");
    Ok(())
}

pub async fn delete_stock(state: &AppState, id: &str) -> Result<(), AppError> {
    let oid = ObjectId::parse_str(id).map_err(|_| AppError::NotFound("Stock not found."))?;
    let stocks = state.db.collection::<Stock>(models::STOCKS);
    let res = stocks.delete_one(doc! { "_id": oid }, None).await?;
    if res.deleted_count == 0 {
        return Err(AppError::NotFound("Stock not found."));
    }

    state.broadcast(&["stocksUpdated"]);
    tracing::info!(stock = %oid, "stock deleted");
    Ok(())
}
