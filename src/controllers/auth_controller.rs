use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::{FieldErrors, FORM_KEY},
    models::CurrentUser,
    services::{activity_service, auth_service},
    AppState,
};

use super::{htmx_redirect, is_htmx, page, render_tpl};

const SESSION_DAYS: i64 = 7;

fn form_response(state: &AppState, tpl: &str, values: serde_json::Value, errors: &FieldErrors) -> Response {
    let html = render_tpl(state, tpl, &json!({ "values": values, "errors": errors }));
    (StatusCode::OK, Html(html)).into_response()
}

fn signed_in(state: &AppState, headers: &HeaderMap, jar: CookieJar, token: String) -> Response {
    let jar = jar.add(auth_service::auth_cookie(state, token));

    if is_htmx(headers) {
        return (jar, htmx_redirect("/dashboard")).into_response();
    }

    (
        jar,
        (StatusCode::SEE_OTHER, [("Location", "/dashboard")], Html(String::new())),
    )
        .into_response()
}

// ---------------- LOGIN ----------------

pub async fn get_login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    page(&state, &headers, "Login", "pages/login", &json!({}), None)
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

pub async fn post_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let values = json!({ "email": auth_service::normalize_email(&form.email) });

    let creds = match auth_service::validate_login(&form.email, &form.password) {
        Ok(c) => c,
        Err(errors) => return form_response(&state, "pages/login", values, &errors),
    };

    let user = match auth_service::login_user(&state, &creds.email, &creds.password).await {
        Ok(u) => u,
        Err(e) => return form_response(&state, "pages/login", values, &e.field_errors()),
    };

    match auth_service::make_jwt_with_days(&state, &user.id, SESSION_DAYS) {
        Ok(token) => signed_in(&state, &headers, jar, token),
        Err(e) => {
            let errors = FieldErrors::from([(FORM_KEY.to_string(), e.user_message())]);
            form_response(&state, "pages/login", values, &errors)
        }
    }
}

// ---------------- REGISTER ----------------

pub async fn get_register(State(state): State<AppState>, headers: HeaderMap) -> Response {
    page(&state, &headers, "Register", "pages/register", &json!({}), None)
}

#[derive(Deserialize)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,

    #[serde(default)]
    pub confirm_password: String,
}

pub async fn post_register(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Response {
    let values = json!({
        "name": form.name.trim(),
        "email": auth_service::normalize_email(&form.email),
    });

    let reg = match auth_service::validate_registration(&form.name, &form.email, &form.password, &form.confirm_password) {
        Ok(r) => r,
        Err(errors) => return form_response(&state, "pages/register", values, &errors),
    };

    let user_id = match auth_service::register_user(&state, &reg.name, &reg.email, &reg.password).await {
        Ok(id) => id,
        Err(e) => return form_response(&state, "pages/register", values, &e.field_errors()),
    };

    match auth_service::make_jwt_with_days(&state, &user_id, SESSION_DAYS) {
        Ok(token) => signed_in(&state, &headers, jar, token),
        Err(e) => {
            let errors = FieldErrors::from([(FORM_KEY.to_string(), e.user_message())]);
            form_response(&state, "pages/register", values, &errors)
        }
    }
}

// ---------------- LOGOUT ----------------

pub async fn logout(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(Extension(u)) = user {
        activity_service::log_activity(&state, u.id, "Logged out").await;
    }
    let jar = jar.add(auth_service::clear_auth_cookie(&state));
    (jar, (StatusCode::SEE_OTHER, [("Location", "/")]))
}
