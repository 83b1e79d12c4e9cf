use std::cmp::Ordering;
use std::collections::HashMap;

use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::FindOptions;
use serde::Serialize;

use crate::{
    errors::AppError,
    models::{self, Stock, TradeSide, Transaction, User},
    AppState,
};

use super::{coin_service::fmt_ts, stock_service};

#[derive(Debug, Clone, Serialize)]
pub struct HoldingRow {
    pub symbol: String,
    pub name: String,
    pub quantity: i64,
    pub avg_price: f64,
    pub current_price: f64,
    pub value: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub pnl_class: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioView {
    pub rows: Vec<HoldingRow>,
    pub coins: f64,
    pub holdings_value: f64,
    pub net_worth: f64,
    pub total_pnl: f64,
    pub total_pnl_class: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub timestamp: String,
    pub symbol: String,
    pub name: String,
    pub side: &'static str,
    pub quantity: i64,
    pub price: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Symbol,
    Quantity,
    Value,
    Pnl,
    Buying,
    Current,
}

impl SortKey {
    pub fn parse(raw: &str) -> SortKey {
        match raw {
            "quantity" => SortKey::Quantity,
            "value" => SortKey::Value,
            "pl" => SortKey::Pnl,
            "buying" => SortKey::Buying,
            "current" => SortKey::Current,
            _ => SortKey::Symbol,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Symbol => "symbol",
            SortKey::Quantity => "quantity",
            SortKey::Value => "value",
            SortKey::Pnl => "pl",
            SortKey::Buying => "buying",
            SortKey::Current => "current",
        }
    }
}

fn pnl_class(pnl: f64) -> &'static str {
    if pnl > 0.0 {
        "text-success"
    } else if pnl < 0.0 {
        "text-danger"
    } else {
        "text-muted"
    }
}

/// Volume-weighted mean price of the buys for `symbol`; 0 with no buys.
pub fn average_buy_price(txs: &[Transaction], symbol: &str) -> f64 {
    let (cost, qty) = txs
        .iter()
        .filter(|t| t.side == TradeSide::Buy && t.stock_symbol == symbol)
        .fold((0.0, 0i64), |(c, q), t| (c + t.price * t.quantity as f64, q + t.quantity));

    if qty > 0 { cost / qty as f64 } else { 0.0 }
}

pub fn build_rows(
    holdings: &HashMap<String, i64>,
    txs: &[Transaction],
    stocks: &HashMap<String, Stock>,
) -> Vec<HoldingRow> {
    holdings
        .iter()
        .filter(|(sym, qty)| **qty > 0 && !sym.trim().is_empty())
        .map(|(sym, qty)| {
            let stock = stocks.get(sym);
            let current = stock.map(|s| s.price).unwrap_or(0.0);
            let avg = average_buy_price(txs, sym);
            let pnl = (current - avg) * *qty as f64;
            let pnl_pct = if avg > 0.0 { (current - avg) / avg * 100.0 } else { 0.0 };

            HoldingRow {
                symbol: sym.clone(),
                name: stock.map(|s| s.name.clone()).unwrap_or_else(|| sym.clone()),
                quantity: *qty,
                avg_price: avg,
                current_price: current,
                value: current * *qty as f64,
                pnl,
                pnl_pct,
                pnl_class: pnl_class(pnl),
            }
        })
        .collect()
}

pub fn sort_rows(rows: &mut [HoldingRow], key: SortKey, descending: bool) {
    let by_f64 = |a: f64, b: f64| a.partial_cmp(&b).unwrap_or(Ordering::Equal);

    rows.sort_by(|a, b| {
        let ord = match key {
            SortKey::Symbol => a.symbol.cmp(&b.symbol),
            SortKey::Quantity => a.quantity.cmp(&b.quantity),
            SortKey::Value => by_f64(a.value, b.value),
            SortKey::Pnl => by_f64(a.pnl, b.pnl),
            SortKey::Buying => by_f64(a.avg_price, b.avg_price),
            SortKey::Current => by_f64(a.current_price, b.current_price),
        }
        .then_with(|| a.symbol.cmp(&b.symbol));

        if descending { ord.reverse() } else { ord }
    });
}

pub fn summarize(rows: Vec<HoldingRow>, coins: f64) -> PortfolioView {
    let holdings_value: f64 = rows.iter().map(|r| r.value).sum();
    let total_pnl: f64 = rows.iter().map(|r| r.pnl).sum();

    PortfolioView {
        rows,
        coins,
        holdings_value,
        net_worth: coins + holdings_value,
        total_pnl,
        total_pnl_class: pnl_class(total_pnl),
    }
}

pub async fn stocks_by_symbol(state: &AppState) -> Result<HashMap<String, Stock>, AppError> {
    Ok(stock_service::list_stocks(state)
        .await?
        .into_iter()
        .map(|s| (s.symbol.clone(), s))
        .collect())
}

pub async fn list_user_transactions(
    state: &AppState,
    user_id: ObjectId,
    side: Option<TradeSide>,
    limit: Option<i64>,
) -> Result<Vec<Transaction>, AppError> {
    let col = state.db.collection::<Transaction>(models::TRANSACTIONS);
    let mut filter = doc! { "user_id": user_id };
    if let Some(s) = side {
        filter.insert("type", s.as_str());
    }
    let find_opts = FindOptions::builder()
        .sort(doc! { "timestamp": -1 })
        .limit(limit)
        .build();

    let mut cursor = col.find(filter, find_opts).await?;
    let mut out = vec![];
    while let Some(res) = cursor.next().await {
        out.push(res?);
    }
    Ok(out)
}

pub fn transaction_views(txs: Vec<Transaction>) -> Vec<TransactionView> {
    txs.into_iter()
        .map(|t| TransactionView {
            timestamp: fmt_ts(t.timestamp),
            total: models::round2(t.price * t.quantity as f64),
            symbol: t.stock_symbol,
            name: t.stock_name,
            side: t.side.as_str(),
            quantity: t.quantity,
            price: t.price,
        })
        .collect()
}

pub async fn get_portfolio(
    state: &AppState,
    user_id: ObjectId,
    key: SortKey,
    descending: bool,
) -> Result<PortfolioView, AppError> {
    let users = state.db.collection::<User>(models::USERS);
    let user = users
        .find_one(doc! { "_id": user_id }, None)
        .await?
        .ok_or(AppError::NotFound("User not found."))?;

    let txs = list_user_transactions(state, user_id, Some(TradeSide::Buy), None).await?;
    let stocks = stocks_by_symbol(state).await?;

    let mut rows = build_rows(&user.owned_stocks, &txs, &stocks);
    sort_rows(&mut rows, key, descending);
    Ok(summarize(rows, user.coins))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(sym: &str, side: TradeSide, price: f64, qty: i64) -> Transaction {
        Transaction {
            id: ObjectId::new(),
            user_id: ObjectId::new(),
            stock_symbol: sym.into(),
            stock_name: format!("{sym} Corp"),
            price,
            quantity: qty,
            side,
            timestamp: 0,
        }
    }

    fn stock(sym: &str, price: f64) -> (String, Stock) {
        (
            sym.to_string(),
            Stock {
                id: ObjectId::new(),
                symbol: sym.into(),
                name: format!("{sym} Corp"),
                price,
                available_shares: 100,
                last_updated: 0,
            },
        )
    }

    #[test]
    fn average_ignores_sells_and_other_symbols() {
        let txs = vec![
            tx("ACME", TradeSide::Buy, 10.0, 10),
            tx("ACME", TradeSide::Buy, 20.0, 30),
            tx("ACME", TradeSide::Sell, 99.0, 5),
            tx("BOLT", TradeSide::Buy, 1.0, 1),
        ];
        assert_eq!(average_buy_price(&txs, "ACME"), 17.5);
        assert_eq!(average_buy_price(&txs, "NONE"), 0.0);
    }

    #[test]
    fn rows_compute_value_and_pnl() {
        let holdings = HashMap::from([("ACME".to_string(), 4), ("GONE".to_string(), 0)]);
        let txs = vec![tx("ACME", TradeSide::Buy, 10.0, 4)];
        let stocks = HashMap::from([stock("ACME", 12.5)]);

        let rows = build_rows(&holdings, &txs, &stocks);
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.value, 50.0);
        assert_eq!(r.pnl, 10.0);
        assert_eq!(r.pnl_pct, 25.0);
        assert_eq!(r.pnl_class, "text-success");
        assert_eq!(r.name, "ACME Corp");
    }

    #[test]
    fn delisted_holding_is_valued_at_zero() {
        let holdings = HashMap::from([("OLD".to_string(), 2)]);
        let rows = build_rows(&holdings, &[], &HashMap::new());
        assert_eq!(rows[0].current_price, 0.0);
        assert_eq!(rows[0].name, "OLD");
        assert_eq!(rows[0].pnl_class, "text-muted");
    }

    #[test]
    fn sorting_by_each_key() {
        let holdings = HashMap::from([("A".to_string(), 1), ("B".to_string(), 5), ("C".to_string(), 3)]);
        let txs = vec![
            tx("A", TradeSide::Buy, 50.0, 1),
            tx("B", TradeSide::Buy, 1.0, 5),
            tx("C", TradeSide::Buy, 10.0, 3),
        ];
        let stocks = HashMap::from([stock("A", 40.0), stock("B", 2.0), stock("C", 20.0)]);
        let mut rows = build_rows(&holdings, &txs, &stocks);

        let order = |rows: &[HoldingRow]| rows.iter().map(|r| r.symbol.as_str()).collect::<Vec<_>>().join("");

        sort_rows(&mut rows, SortKey::Symbol, false);
        assert_eq!(order(&rows), "ABC");
        sort_rows(&mut rows, SortKey::Quantity, true);
        assert_eq!(order(&rows), "BCA");
        sort_rows(&mut rows, SortKey::Value, false);
        assert_eq!(order(&rows), "BAC");
        sort_rows(&mut rows, SortKey::Pnl, true);
        assert_eq!(order(&rows), "CBA");
        sort_rows(&mut rows, SortKey::Buying, false);
        assert_eq!(order(&rows), "BCA");
        sort_rows(&mut rows, SortKey::Current, true);
        assert_eq!(order(&rows), "ACB");
    }

    #[test]
    fn unknown_sort_key_falls_back_to_symbol() {
        assert_eq!(SortKey::parse("nonsense"), SortKey::Symbol);
        assert_eq!(SortKey::parse("pl"), SortKey::Pnl);
        assert_eq!(SortKey::parse(SortKey::Buying.as_str()), SortKey::Buying);
    }

    #[test]
    fn summary_totals() {
        let holdings = HashMap::from([("A".to_string(), 2)]);
        let txs = vec![tx("A", TradeSide::Buy, 10.0, 2)];
        let stocks = HashMap::from([stock("A", 8.0)]);
        let view = summarize(build_rows(&holdings, &txs, &stocks), 100.0);
        assert_eq!(view.holdings_value, 16.0);
        assert_eq!(view.net_worth, 116.0);
        assert_eq!(view.total_pnl, -4.0);
        assert_eq!(view.total_pnl_class, "text-danger");
    }
}
