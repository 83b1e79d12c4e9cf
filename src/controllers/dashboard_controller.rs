use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{
    errors::AppError,
    models::CurrentUser,
    services::{coin_service, portfolio_service, price_ticker, user_service},
    AppState,
};

use super::{error_page, page, unauthorized_snippet};

const RECENT_TRADES: i64 = 5;

async fn dashboard_ctx(state: &AppState, u: &CurrentUser) -> Result<serde_json::Value, AppError> {
    let portfolio = portfolio_service::get_portfolio(state, u.id, portfolio_service::SortKey::Value, true).await?;
    let pending = coin_service::pending_count(state, u.id).await?;
    let countdown = price_ticker::countdown(state).await?;
    let recent = portfolio_service::list_user_transactions(state, u.id, None, Some(RECENT_TRADES)).await?;

    Ok(json!({
        "name": u.name,
        "role": u.role,
        "portfolio": portfolio,
        "holdings_count": portfolio.rows.len(),
        "pending_count": pending,
        "max_pending": state.settings.max_pending_requests,
        "countdown": countdown,
        "recent": portfolio_service::transaction_views(recent),
    }))
}

// GET /dashboard
pub async fn get_dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match dashboard_ctx(&state, &u).await {
        Ok(ctx) => page(&state, &headers, "Dashboard", "pages/dashboard", &ctx, Some(&u)),
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

// GET /me
pub async fn me(State(state): State<AppState>, user: Option<Extension<CurrentUser>>) -> Response {
    let Some(Extension(u)) = user else {
        return (StatusCode::UNAUTHORIZED, Html("not logged in".to_string())).into_response();
    };

    let coins = match user_service::get_user(&state, u.id).await {
        Ok(Some(full)) => full.coins,
        Ok(None) => return (StatusCode::UNAUTHORIZED, Html("not logged in".to_string())).into_response(),
        Err(e) => {
            tracing::error!(error = %e, user = %u.id, "me lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "server error" }))).into_response();
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "id": u.id.to_hex(),
            "name": u.name,
            "email": u.email,
            "role": u.role,
            "coins": coins,
        })),
    )
        .into_response()
}
