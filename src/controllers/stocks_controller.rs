use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde_json::json;

use crate::{
    errors::AppError,
    models::CurrentUser,
    services::{coin_service::fmt_ts, price_ticker, stock_service, trading_service, user_service},
    AppState,
};

use super::{error_page, flash, page, partial, unauthorized_snippet};

async fn table_ctx(state: &AppState, u: &CurrentUser) -> Result<serde_json::Value, AppError> {
    let stocks = stock_service::list_stocks(state).await?;
    let coins = user_service::get_user(state, u.id)
        .await?
        .map(|full| full.coins)
        .unwrap_or(0.0);

    let rows: Vec<serde_json::Value> = stocks
        .into_iter()
        .map(|s| {
            json!({
                "symbol": s.symbol,
                "name": s.name,
                "price": s.price,
                "available_shares": s.available_shares,
                "sold_out": s.available_shares == 0,
                "max_affordable": trading_service::max_affordable(coins, s.price, s.available_shares),
                "last_updated": fmt_ts(s.last_updated),
            })
        })
        .collect();

    Ok(json!({ "stocks": rows, "coins": coins }))
}

// GET /stocks
pub async fn get_stocks(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let table = match table_ctx(&state, &u).await {
        Ok(t) => t,
        Err(e) => return error_page(&state, &headers, Some(&u), e),
    };
    let countdown = match price_ticker::countdown(&state).await {
        Ok(c) => c,
        Err(e) => return error_page(&state, &headers, Some(&u), e),
    };

    let ctx = json!({ "table": table, "countdown": countdown });
    page(&state, &headers, "Stocks", "pages/stocks", &ctx, Some(&u))
}

// GET /stocks/table (HTMX partial)
pub async fn get_stocks_table(State(state): State<AppState>, user: Option<Extension<CurrentUser>>) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match table_ctx(&state, &u).await {
        Ok(ctx) => partial(&state, "partials/stocks_table", &ctx),
        Err(e) => (StatusCode::OK, Html(flash(&state, "danger", &e.user_message()))).into_response(),
    }
}

// GET /stocks/countdown (HTMX partial)
pub async fn get_countdown(State(state): State<AppState>) -> Response {
    match price_ticker::countdown(&state).await {
        Ok(c) => partial(&state, "partials/countdown", &json!({ "countdown": c })),
        Err(e) => {
            tracing::warn!(error = %e, "countdown lookup failed");
            partial(&state, "partials/countdown", &json!({ "countdown": "--:--" }))
        }
    }
}
