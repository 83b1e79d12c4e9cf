use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde_json::json;

use crate::{errors::AppError, models::CurrentUser, render, AppState};

pub mod home_controller;
pub mod auth_controller;
pub mod dashboard_controller;
pub mod stocks_controller;
pub mod trading_controller;
pub mod portfolio_controller;
pub mod coins_controller;
pub mod market_controller;
pub mod admin_controller;
pub mod stock_admin_controller;
pub mod realtime_controller;

pub(crate) fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get("HX-Request")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub(crate) fn hx_trigger_value(events: &[&str]) -> HeaderValue {
    // HX-Trigger expects JSON: {"evt":true,...}
    let mut s = String::from("{");
    for (i, ev) in events.iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        s.push('"');
        s.push_str(ev);
        s.push_str("\":true");
    }
    s.push('}');
    HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static("{}"))
}

pub(crate) fn htmx_redirect(path: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("HX-Redirect", HeaderValue::from_static(path));
    (StatusCode::OK, headers, Html(String::new())).into_response()
}

pub(crate) fn unauthorized_snippet() -> Response {
    (StatusCode::UNAUTHORIZED, Html(r#"<div class="text-danger">Unauthorized</div>"#.to_string())).into_response()
}

pub(crate) fn render_tpl(state: &AppState, tpl: &str, ctx: &serde_json::Value) -> String {
    state
        .hbs
        .render(tpl, ctx)
        .unwrap_or_else(|e| format!("template error: {e}"))
}

/// Status line for htmx targets. `kind` is a bootstrap contextual suffix.
pub(crate) fn flash(state: &AppState, kind: &str, message: &str) -> String {
    render_tpl(state, "partials/flash", &json!({ "kind": kind, "message": message }))
}

pub(crate) fn partial(state: &AppState, tpl: &str, ctx: &serde_json::Value) -> Response {
    (StatusCode::OK, Html(render_tpl(state, tpl, ctx))).into_response()
}

/// Renders `tpl` alone for htmx navigation and inside the layout otherwise.
pub(crate) fn page_with_status(
    state: &AppState,
    headers: &HeaderMap,
    status: StatusCode,
    title: &str,
    tpl: &str,
    ctx: &serde_json::Value,
    user: Option<&CurrentUser>,
) -> Response {
    let body = match state.hbs.render(tpl, ctx) {
        Ok(s) => s,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("template error: {e}")),
            )
                .into_response()
        }
    };

    if is_htmx(headers) {
        return (status, Html(body)).into_response();
    }

    match render::render_full(state, title, body, user) {
        Ok(page) => (status, Html(page)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Html(e)).into_response(),
    }
}

pub(crate) fn page(
    state: &AppState,
    headers: &HeaderMap,
    title: &str,
    tpl: &str,
    ctx: &serde_json::Value,
    user: Option<&CurrentUser>,
) -> Response {
    page_with_status(state, headers, StatusCode::OK, title, tpl, ctx, user)
}

/// Full-page answer for a service error on a GET.
pub(crate) fn error_page(state: &AppState, headers: &HeaderMap, user: Option<&CurrentUser>, err: AppError) -> Response {
    match err {
        AppError::NotFound(msg) => page_with_status(
            state,
            headers,
            StatusCode::NOT_FOUND,
            "Not found",
            "pages/not_found",
            &json!({ "message": msg }),
            user,
        ),
        AppError::Forbidden(msg) => page_with_status(
            state,
            headers,
            StatusCode::FORBIDDEN,
            "Forbidden",
            "pages/forbidden",
            &json!({ "message": msg }),
            user,
        ),
        other => {
            let msg = other.user_message();
            (StatusCode::INTERNAL_SERVER_ERROR, Html(flash(state, "danger", &msg))).into_response()
        }
    }
}

/// Status snippet plus `HX-Trigger` for the events the client should refresh on.
pub(crate) fn snippet_with_trigger(state: &AppState, kind: &str, message: &str, events: &[&str]) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("HX-Trigger", hx_trigger_value(events));
    (StatusCode::OK, headers, Html(flash(state, kind, message))).into_response()
}

pub(crate) fn fmt2(v: f64) -> String {
    format!("{:.2}", v)
}
