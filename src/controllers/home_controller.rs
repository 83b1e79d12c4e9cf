use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use mongodb::bson::doc;
use serde_json::json;

use crate::{models::CurrentUser, AppState};

use super::{page, page_with_status};

pub async fn home(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let user_ref = user.as_ref().map(|Extension(u)| u);
    let ctx = json!({
        "is_logged_in": user_ref.is_some(),
        "starting_coins": state.settings.starting_coins,
    });
    page(&state, &headers, "CoinMarket", "pages/home", &ctx, user_ref)
}

pub async fn not_found(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let user_ref = user.as_ref().map(|Extension(u)| u);
    page_with_status(
        &state,
        &headers,
        StatusCode::NOT_FOUND,
        "404",
        "pages/not_found",
        &json!({}),
        user_ref,
    )
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Html("ok".to_string()))
}

pub async fn health_db(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.run_command(doc! { "ping": 1 }, None).await {
        Ok(_) => (StatusCode::OK, Html("mongo: ok".to_string())).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check ping failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Html("mongo: unavailable".to_string())).into_response()
        }
    }
}
