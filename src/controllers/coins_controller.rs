use axum::{
    extract::{Extension, Form, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    models::CurrentUser,
    services::{activity_service, coin_service, user_service},
    AppState,
};

use super::{error_page, hx_trigger_value, page, render_tpl, unauthorized_snippet};

const ACTIVITY_LIMIT: i64 = 100;

fn form_ctx(
    state: &AppState,
    values: serde_json::Value,
    errors: serde_json::Value,
    success: Option<String>,
) -> serde_json::Value {
    json!({
        "values": values,
        "errors": errors,
        "success": success,
        "max_pending": state.settings.max_pending_requests,
    })
}

// GET /coins/request
pub async fn get_request_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let ctx = form_ctx(&state, json!({}), json!({}), None);
    page(&state, &headers, "Request coins", "pages/coins_request", &ctx, Some(&u))
}

#[derive(Deserialize)]
pub struct CoinRequestForm {
    #[serde(default)]
    pub coin_amount: String,
    #[serde(default)]
    pub reason: String,
}

// POST /coins/request (HTMX form)
pub async fn post_request(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Form(form): Form<CoinRequestForm>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let values = json!({ "coin_amount": form.coin_amount.trim(), "reason": form.reason.trim() });

    let amount = match form.coin_amount.trim().parse::<f64>() {
        Ok(a) => a,
        Err(_) => {
            let ctx = form_ctx(&state, values, json!({ "coin_amount": "Please enter a valid coin amount" }), None);
            return (StatusCode::OK, Html(render_tpl(&state, "partials/coin_request_form", &ctx))).into_response();
        }
    };

    match coin_service::send_request(&state, u.id, amount, &form.reason).await {
        Ok(req) => {
            let msg = format!("Request for {:.2} coins sent. An admin will review it.", req.coin_amount);
            let ctx = form_ctx(&state, json!({}), json!({}), Some(msg));
            let mut headers = HeaderMap::new();
            headers.insert("HX-Trigger", hx_trigger_value(&["coinRequestsUpdated"]));
            (StatusCode::OK, headers, Html(render_tpl(&state, "partials/coin_request_form", &ctx))).into_response()
        }
        Err(e) => {
            let ctx = form_ctx(&state, values, json!(e.field_errors()), None);
            (StatusCode::OK, Html(render_tpl(&state, "partials/coin_request_form", &ctx))).into_response()
        }
    }
}

// GET /coins/requests
pub async fn get_my_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match coin_service::list_user_requests(&state, u.id).await {
        Ok(requests) => {
            let ctx = json!({ "has_rows": !requests.is_empty(), "requests": requests });
            page(&state, &headers, "My coin requests", "pages/coins_requests", &ctx, Some(&u))
        }
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

// GET /coins/history
pub async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match coin_service::coin_history(&state, u.id).await {
        Ok(entries) => {
            let ctx = json!({ "has_rows": !entries.is_empty(), "entries": entries });
            page(&state, &headers, "Coin history", "pages/coins_history", &ctx, Some(&u))
        }
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

// GET /activity
pub async fn get_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match activity_service::list_user_activity(&state, u.id, ACTIVITY_LIMIT).await {
        Ok(logs) => {
            let rows = user_service::activity_views(logs);
            let ctx = json!({ "has_rows": !rows.is_empty(), "activity": rows });
            page(&state, &headers, "Activity", "pages/activity", &ctx, Some(&u))
        }
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

