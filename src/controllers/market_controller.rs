use axum::{
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use crate::{models::CurrentUser, services::market, AppState};

use super::{page, partial};

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

// GET /market
pub async fn get_market(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let user_ref = user.as_ref().map(|Extension(u)| u);
    let ctx = json!({ "configured": state.market.is_configured() });
    page(&state, &headers, "Market lookup", "pages/market", &ctx, user_ref)
}

// GET /market/search?q= (HTMX partial)
pub async fn get_search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Response {
    let q = query.q.unwrap_or_default();
    let ctx = market::search_ctx(&state.market, &q).await;
    partial(&state, "partials/market_results", &ctx)
}

// GET /market/quote/:symbol (HTMX partial)
pub async fn get_quote(State(state): State<AppState>, Path(symbol): Path<String>) -> Response {
    let ctx = market::quote_ctx(&state.market, &symbol).await;
    partial(&state, "partials/market_quote", &ctx)
}
