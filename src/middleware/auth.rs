use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    models::{self, CurrentUser, Role, User},
    render, AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    // user id as hex string
    pub sub: String,
    // expiry (unix timestamp seconds)
    pub exp: usize,
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;

    for part in raw.split(';') {
        let part = part.trim();
        let mut it = part.splitn(2, '=');
        let k = it.next()?.trim();
        let v = it.next()?.trim();
        if k == name {
            return Some(v.to_string());
        }
    }
    None
}

pub async fn inject_current_user(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let cookie_name = state.settings.jwt_cookie_name.as_str();

    if let Some(token) = get_cookie(req.headers(), cookie_name) {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(state.settings.jwt_secret.as_bytes()),
            &validation,
        );

        if let Ok(data) = decoded {
            if let Ok(user_id) = ObjectId::parse_str(&data.claims.sub) {
                let users = state.db.collection::<User>(models::USERS);

                // role is re-read on every request so promotions/demotions apply immediately
                match users.find_one(doc! { "_id": user_id }, None).await {
                    Ok(Some(user)) => {
                        req.extensions_mut().insert(CurrentUser::from(user));
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "session lookup failed"),
                }
            }
        }
    }

    next.run(req).await
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get("HX-Request")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn wants_stream_or_json(path: &str, headers: &HeaderMap) -> bool {
    if path == "/events" || path == "/me" {
        return true;
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream") || v.contains("application/json"))
        .unwrap_or(false)
}

pub fn is_public_path(path: &str) -> bool {
    path == "/"
        || path == "/login"
        || path == "/register"
        || path == "/logout"
        || path == "/favicon.ico"
        || path == "/health"
        || path.starts_with("/health/")
        || path.starts_with("/static/")
}

/// Minimum role a path demands beyond being logged in.
pub fn required_role(path: &str) -> Option<Role> {
    let under = |prefix: &str| path == prefix || path.starts_with(&format!("{prefix}/"));

    if under("/admin/stocks") || under("/leaderboard") || under("/users") {
        return Some(Role::Superadmin);
    }
    if path.starts_with("/admin/users/") && path.ends_with("/role") {
        return Some(Role::Superadmin);
    }
    if under("/admin") {
        return Some(Role::Admin);
    }
    None
}

fn forbidden(state: &AppState, headers: &HeaderMap, user: &CurrentUser) -> Response {
    let body = state
        .hbs
        .render("pages/forbidden", &json!({ "role": user.role }))
        .unwrap_or_else(|e| format!("template error: {e}"));

    if is_htmx(headers) {
        return (StatusCode::FORBIDDEN, Html(body)).into_response();
    }

    match render::render_full(state, "Forbidden", body, Some(user)) {
        Ok(page) => (StatusCode::FORBIDDEN, Html(page)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Html(e)).into_response(),
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    if is_public_path(&path) {
        return next.run(req).await;
    }

    if let Some(user) = req.extensions().get::<CurrentUser>() {
        if let Some(min) = required_role(&path) {
            if user.role < min {
                tracing::warn!(user = %user.id, role = %user.role, path = %path, "role check failed");
                return forbidden(&state, req.headers(), user);
            }
        }
        return next.run(req).await;
    }

    // Not logged in:
    // - SSE/JSON: 401
    // - HTMX: force full redirect to /login
    // - Normal: redirect to /login
    if wants_stream_or_json(&path, req.headers()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if is_htmx(req.headers()) {
        let mut headers = HeaderMap::new();
        headers.insert("HX-Redirect", HeaderValue::from_static("/login"));
        return (StatusCode::OK, headers, Html("".to_string())).into_response();
    }

    Redirect::to("/login").into_response()
}
