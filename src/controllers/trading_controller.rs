use axum::{
    extract::{Extension, Form, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::{AppError, FORM_KEY},
    models::CurrentUser,
    services::{trading_service, trading_service::TradeView},
    AppState,
};

use super::{error_page, flash, fmt2, page, partial, snippet_with_trigger, unauthorized_snippet};

const TRADE_EVENTS: &[&str] = &["coinsUpdated", "holdingsUpdated", "transactionsUpdated", "stocksUpdated"];

fn panel_ctx(view: &TradeView) -> serde_json::Value {
    json!({
        "symbol": view.stock.symbol,
        "name": view.stock.name,
        "price": view.stock.price,
        "available_shares": view.stock.available_shares,
        "coins": view.coins,
        "holding": view.holding,
        "has_holding": view.holding > 0,
        "max_affordable": view.max_affordable,
    })
}

// GET /trade/:symbol
pub async fn get_trade_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(symbol): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match trading_service::get_trade_view(&state, u.id, &symbol.to_uppercase()).await {
        Ok(view) => {
            let title = format!("Trade {}", view.stock.symbol);
            page(&state, &headers, &title, "pages/trade", &panel_ctx(&view), Some(&u))
        }
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

// GET /trade/:symbol/panel (HTMX partial)
pub async fn get_trade_panel(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match trading_service::get_trade_view(&state, u.id, &symbol.to_uppercase()).await {
        Ok(view) => partial(&state, "partials/trade_panel", &panel_ctx(&view)),
        Err(e) => (StatusCode::OK, Html(flash(&state, "danger", &e.user_message()))).into_response(),
    }
}

#[derive(Deserialize)]
pub struct TradeForm {
    pub qty: String,
}

fn trade_error(state: &AppState, err: AppError, fallback: &str) -> Response {
    let errs = err.field_errors();
    let msg = ["balance", "qty", "symbol", FORM_KEY]
        .iter()
        .find_map(|k| errs.get(*k))
        .cloned()
        .unwrap_or_else(|| fallback.to_string());
    (StatusCode::OK, Html(flash(state, "danger", &msg))).into_response()
}

fn parse_qty(state: &AppState, raw: &str) -> Result<i64, Response> {
    raw.trim().parse::<i64>().map_err(|_| {
        (StatusCode::OK, Html(flash(state, "danger", "Enter a valid quantity."))).into_response()
    })
}

// POST /trade/:symbol/buy
pub async fn post_trade_buy(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    user: Option<Extension<CurrentUser>>,
    Form(form): Form<TradeForm>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let qty = match parse_qty(&state, &form.qty) {
        Ok(q) => q,
        Err(res) => return res,
    };

    let result = match trading_service::market_buy(&state, u.id, &symbol, qty).await {
        Ok(r) => r,
        Err(e) => return trade_error(&state, e, "Could not buy."),
    };

    let msg = format!(
        "Bought {} {} @ {} (Cost: {}, New balance: {})",
        result.qty,
        result.symbol,
        fmt2(result.fill_price),
        fmt2(result.total),
        fmt2(result.new_coins)
    );
    snippet_with_trigger(&state, "success", &msg, TRADE_EVENTS)
}

// POST /trade/:symbol/sell
pub async fn post_trade_sell(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    user: Option<Extension<CurrentUser>>,
    Form(form): Form<TradeForm>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let qty = match parse_qty(&state, &form.qty) {
        Ok(q) => q,
        Err(res) => return res,
    };

    let result = match trading_service::market_sell(&state, u.id, &symbol, qty).await {
        Ok(r) => r,
        Err(e) => return trade_error(&state, e, "Could not sell."),
    };

    let msg = format!(
        "Sold {} {} @ {} (Proceeds: {}, New balance: {})",
        result.qty,
        result.symbol,
        fmt2(result.fill_price),
        fmt2(result.total),
        fmt2(result.new_coins)
    );
    snippet_with_trigger(&state, "success", &msg, TRADE_EVENTS)
}
