use axum::{
    extract::{Extension, Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::{AppError, FORM_KEY},
    models::{CurrentUser, RequestStatus, Role},
    services::{coin_service, user_service, user_service::UserEdit},
    AppState,
};

use super::{error_page, flash, hx_trigger_value, page, render_tpl, unauthorized_snippet};

const ROLES: [Role; 3] = [Role::User, Role::Admin, Role::Superadmin];

fn first_message(err: &AppError) -> String {
    let errs = err.field_errors();
    errs.get(FORM_KEY)
        .or_else(|| errs.values().next())
        .cloned()
        .unwrap_or_else(|| err.user_message())
}

// ---------------- USERS ----------------

async fn users_ctx(state: &AppState, actor: &CurrentUser) -> Result<serde_json::Value, AppError> {
    let users = user_service::list_users(state).await?;
    let is_superadmin = actor.role == Role::Superadmin;

    let rows: Vec<serde_json::Value> = users
        .into_iter()
        .map(|u| {
            let roles: Vec<serde_json::Value> = ROLES
                .iter()
                .map(|r| json!({ "value": r.as_str(), "selected": *r == u.role }))
                .collect();
            let is_self = u.id == actor.id.to_hex();
            json!({
                "user": u,
                "roles": roles,
                "is_self": is_self,
                "can_set_role": is_superadmin && !is_self,
            })
        })
        .collect();

    Ok(json!({ "users": rows, "is_superadmin": is_superadmin }))
}

/// Re-renders the users table with a status line on top.
async fn users_table(state: &AppState, actor: &CurrentUser, kind: &str, message: &str) -> Response {
    let html = match users_ctx(state, actor).await {
        Ok(mut ctx) => {
            ctx["flash"] = json!({ "kind": kind, "message": message });
            render_tpl(state, "partials/admin_users_table", &ctx)
        }
        Err(e) => flash(state, "danger", &e.user_message()),
    };

    let mut headers = HeaderMap::new();
    if kind == "success" {
        headers.insert("HX-Trigger", hx_trigger_value(&["usersUpdated"]));
    }
    (StatusCode::OK, headers, Html(html)).into_response()
}

// GET /admin/users
pub async fn get_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match users_ctx(&state, &u).await {
        Ok(ctx) => page(&state, &headers, "Users", "pages/admin_users", &ctx, Some(&u)),
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

#[derive(Deserialize)]
pub struct UserEditForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub coins: String,
}

// POST /admin/users/:id
pub async fn post_update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
    Form(form): Form<UserEditForm>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let coins = match form.coins.trim().parse::<f64>() {
        Ok(c) => c,
        Err(_) => return (StatusCode::OK, Html(flash(&state, "danger", "Enter a valid coin balance."))).into_response(),
    };
    let edit = UserEdit { name: form.name, email: form.email, coins };

    match user_service::admin_update_user(&state, &u, &id, &edit).await {
        Ok(()) => users_table(&state, &u, "success", "User updated.").await,
        Err(e) => users_table(&state, &u, "danger", &first_message(&e)).await,
    }
}

// POST /admin/users/:id/delete
pub async fn post_delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match user_service::delete_user(&state, &u, &id).await {
        Ok(()) => users_table(&state, &u, "success", "User deleted.").await,
        Err(e) => users_table(&state, &u, "danger", &first_message(&e)).await,
    }
}

#[derive(Deserialize)]
pub struct RoleForm {
    #[serde(default)]
    pub role: String,
}

// POST /admin/users/:id/role
pub async fn post_set_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
    Form(form): Form<RoleForm>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    let Some(role) = Role::parse(&form.role) else {
        return (StatusCode::OK, Html(flash(&state, "danger", "Unknown role."))).into_response();
    };

    match user_service::set_role(&state, &u, &id, role).await {
        Ok(()) => users_table(&state, &u, "success", &format!("Role set to {role}.")).await,
        Err(e) => users_table(&state, &u, "danger", &first_message(&e)).await,
    }
}

// ---------------- COIN REQUESTS ----------------

#[derive(Deserialize, Default)]
pub struct StatusQuery {
    pub status: Option<String>,
}

fn status_filter(q: &StatusQuery) -> Option<RequestStatus> {
    match q.status.as_deref() {
        // pending is the default view; `all` lifts the filter
        None | Some("") => Some(RequestStatus::Pending),
        Some(raw) => RequestStatus::parse(raw),
    }
}

async fn requests_ctx(state: &AppState, filter: Option<RequestStatus>) -> Result<serde_json::Value, AppError> {
    let requests = coin_service::list_requests(state, filter).await?;
    Ok(json!({
        "has_rows": !requests.is_empty(),
        "requests": requests,
        "filter": filter.map(|s| s.as_str()).unwrap_or("all"),
    }))
}

// GET /admin/coin-requests?status=
pub async fn get_coin_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<StatusQuery>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match requests_ctx(&state, status_filter(&q)).await {
        Ok(ctx) => page(&state, &headers, "Coin requests", "pages/admin_requests", &ctx, Some(&u)),
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

async fn decide(state: &AppState, u: &CurrentUser, id: &str, decision: RequestStatus, q: &StatusQuery) -> Response {
    let (kind, message) = match coin_service::decide_request(state, id, decision, u).await {
        Ok(req) => (
            "success",
            format!("Request for {:.2} coins {}.", req.coin_amount, decision.as_str()),
        ),
        Err(e) => ("danger", first_message(&e)),
    };

    let html = match requests_ctx(state, status_filter(q)).await {
        Ok(mut ctx) => {
            ctx["flash"] = json!({ "kind": kind, "message": message });
            render_tpl(state, "partials/admin_requests_table", &ctx)
        }
        Err(e) => flash(state, "danger", &e.user_message()),
    };

    let mut headers = HeaderMap::new();
    headers.insert("HX-Trigger", hx_trigger_value(&["coinRequestsUpdated", "coinsUpdated"]));
    (StatusCode::OK, headers, Html(html)).into_response()
}

// POST /admin/coin-requests/:id/approve
pub async fn post_approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<StatusQuery>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };
    decide(&state, &u, &id, RequestStatus::Approved, &q).await
}

// POST /admin/coin-requests/:id/reject
pub async fn post_reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<StatusQuery>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };
    decide(&state, &u, &id, RequestStatus::Rejected, &q).await
}

// ---------------- SUPERADMIN VIEWS ----------------

// GET /leaderboard
pub async fn get_leaderboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match user_service::leaderboard(&state).await {
        Ok(rows) => {
            let ctx = json!({ "has_rows": !rows.is_empty(), "rows": rows });
            page(&state, &headers, "Leaderboard", "pages/leaderboard", &ctx, Some(&u))
        }
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

// GET /users/:id
pub async fn get_user_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let Some(Extension(u)) = user else {
        return unauthorized_snippet();
    };

    match user_service::profile_view(&state, &id).await {
        Ok(view) => {
            let title = format!("User {}", view.user.name);
            page(&state, &headers, &title, "pages/user_profile", &json!({ "profile": view }), Some(&u))
        }
        Err(e) => error_page(&state, &headers, Some(&u), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_filter_defaults_to_pending() {
        assert_eq!(status_filter(&StatusQuery { status: None }), Some(RequestStatus::Pending));
        assert_eq!(status_filter(&StatusQuery { status: Some("approved".into()) }), Some(RequestStatus::Approved));
        assert_eq!(status_filter(&StatusQuery { status: Some("all".into()) }), None);
    }

    #[test]
    fn first_message_prefers_form_errors() {
        let e = AppError::form("Request already processed.");
        assert_eq!(first_message(&e), "Request already processed.");

        let e = AppError::field("email", "This email is already in use.");
        assert_eq!(first_message(&e), "This email is already in use.");
    }
}
