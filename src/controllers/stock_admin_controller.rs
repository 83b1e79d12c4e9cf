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
    services::{activity_service, coin_service::fmt_ts, stock_service, stock_service::StockInput},
    AppState,
};

use super::{error_page, flash, hx_trigger_value, page, partial, render_tpl, unauthorized_snippet};

#[derive(Deserialize, Default)]
pub struct StockForm {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub available_shares: String,
}

impl From<StockForm> for StockInput {
    fn from(f: StockForm) -> Self {
        StockInput {
            symbol: f.symbol,
            name: f.name,
            price: f.price,
            available_shares: f.available_shares,
        }
    }
}

fn values_of(input: &StockInput) -> serde_json::Value {
    json!({
        "symbol": input.symbol.trim(),
        "name": input.name.trim(),
        "price": input.price.trim(),
        "available_shares": input.available_shares.trim(),
    })
}

async fn table_ctx(state: &AppState) -> Result<serde_json::Value, AppError> {
    let stocks = stock_service::list_stocks(state).await?;
    let rows: Vec<serde_json::Value> = stocks
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id.to_hex(),
                "symbol": s.symbol,
                "name": s.name,
                "price": s.price,
                "available_shares": s.available_shares,
                "last_updated": fmt_ts(s.last_updated),
            })
        })
        .collect();
    Ok(json!({ "has_rows": !rows.is_empty(), "stocks": rows }))
}

async fn table_with_status(state: &AppState, kind: &str, message: &str) -> Response {
    let html = match table_ctx(state).await {
        Ok(mut ctx) => {
            ctx["flash"] = json!({ "kind": kind, "message": message });
            render_tpl(state, "partials/admin_stocks_table", &ctx)
        }
        Err(e) => flash(state, "danger", &e.user_message()),
    };
    (StatusCode::OK, Html(html)).into_response()
}

// GET /admin/stocks
pub async fn get_stocks(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match table_ctx(&state).await {
        Ok(table) => {
            let ctx = json!({ "table": table, "form": { "values": {}, "errors": {} } });
            page(&state, &headers, "Manage stocks", "pages/admin_stocks", &ctx, Some(&u))
        }
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

// GET /admin/stocks/table (HTMX partial)
pub async fn get_stocks_table(State(state): State<AppState>) -> Response {
    match table_ctx(&state).await {
        Ok(ctx) => partial(&state, "partials/admin_stocks_table", &ctx),
        Err(e) => (StatusCode::OK, Html(flash(&state, "danger", &e.user_message()))).into_response(),
    }
}

// POST /admin/stocks
pub async fn post_create_stock(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Form(form): Form<StockForm>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let input = StockInput::from(form);

    match stock_service::create_stock(&state, &input).await {
        Ok(stock) => {
            activity_service::log_activity(&state, u.id, format!("Created stock {}", stock.symbol)).await;
            let ctx = json!({
                "values": {},
                "errors": {},
                "success": format!("{} listed at {:.2}.", stock.symbol, stock.price),
            });
            let mut headers = HeaderMap::new();
            headers.insert("HX-Trigger", hx_trigger_value(&["stocksUpdated"]));
            (StatusCode::OK, headers, Html(render_tpl(&state, "partials/stock_form", &ctx))).into_response()
        }
        Err(e) => {
            let ctx = json!({ "values": values_of(&input), "errors": e.field_errors() });
            partial(&state, "partials/stock_form", &ctx)
        }
    }
}

// POST /admin/stocks/:id
pub async fn post_update_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
    Form(form): Form<StockForm>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let input = StockInput::from(form);
    match stock_service::update_stock(&state, &id, &input).await {
        Ok(()) => {
            activity_service::log_activity(&state, u.id, format!("Updated stock {id}")).await;
            table_with_status(&state, "success", "Stock updated.").await
        }
        Err(e) => {
            let errs = e.field_errors();
            let msg = errs.get(FORM_KEY).or_else(|| errs.values().next()).cloned().unwrap_or_default();
            table_with_status(&state, "danger", &msg).await
        }
    }
}

// POST /admin/stocks/:id/delete
pub async fn post_delete_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match stock_service::delete_stock(&state, &id).await {
        Ok(()) => {
            activity_service::log_activity(&state, u.id, format!("Deleted stock {id}")).await;
            table_with_status(&state, "success", "Stock deleted.").await
        }
        Err(e) => table_with_status(&state, "danger", &e.user_message()).await,
    }
}
