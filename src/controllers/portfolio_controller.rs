use axum::{
    extract::{Extension, Query, State},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    models::{CurrentUser, TradeSide},
    services::{portfolio_service, portfolio_service::SortKey},
    AppState,
};

use super::{error_page, page, unauthorized_snippet};

const COLUMNS: &[(SortKey, &str)] = &[
    (SortKey::Symbol, "Symbol"),
    (SortKey::Quantity, "Quantity"),
    (SortKey::Buying, "Avg. buy"),
    (SortKey::Current, "Current"),
    (SortKey::Value, "Value"),
    (SortKey::Pnl, "P/L"),
];

#[derive(Deserialize, Default)]
pub struct PortfolioQuery {
    pub sort: Option<String>,
    pub order: Option<String>,
}

/// Header links; clicking the active column flips its direction.
fn sort_headers(active: SortKey, descending: bool) -> Vec<serde_json::Value> {
    COLUMNS
        .iter()
        .map(|(key, label)| {
            let is_active = *key == active;
            let next = if is_active && !descending { "desc" } else { "asc" };
            let arrow = match (is_active, descending) {
                (false, _) => "",
                (true, true) => "▼",
                (true, false) => "▲",
            };
            json!({
                "label": label,
                "href": format!("/portfolio?sort={}&order={next}", key.as_str()),
                "active": is_active,
                "arrow": arrow,
            })
        })
        .collect()
}

// GET /portfolio?sort=&order=
pub async fn get_portfolio(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<PortfolioQuery>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let key = SortKey::parse(q.sort.as_deref().unwrap_or(""));
    let descending = q.order.as_deref() == Some("desc");

    match portfolio_service::get_portfolio(&state, u.id, key, descending).await {
        Ok(view) => {
            let ctx = json!({
                "portfolio": view,
                "has_rows": !view.rows.is_empty(),
                "headers": sort_headers(key, descending),
            });
            page(&state, &headers, "Portfolio", "pages/portfolio", &ctx, Some(&u))
        }
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

#[derive(Deserialize, Default)]
pub struct TransactionsQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

// GET /transactions?type=
pub async fn get_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<TransactionsQuery>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let side = q.kind.as_deref().and_then(TradeSide::parse);

    match portfolio_service::list_user_transactions(&state, u.id, side, None).await {
        Ok(txs) => {
            let rows = portfolio_service::transaction_views(txs);
            let ctx = json!({
                "has_rows": !rows.is_empty(),
                "transactions": rows,
                "filter": side.map(|s| s.as_str()).unwrap_or("all"),
            });
            page(&state, &headers, "Transactions", "pages/transactions", &ctx, Some(&u))
        }
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}
