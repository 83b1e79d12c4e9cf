use std::sync::OnceLock;

use axum_extra::extract::cookie::{Cookie, SameSite};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::{doc, oid::ObjectId};
use regex::Regex;

use crate::{
    auth::Claims,
    errors::{AppError, FieldErrors},
    models::{self, LedgerKind, Role, User},
    AppState,
};

use super::{activity_service, coin_service};

pub const MIN_NAME_LEN: usize = 2;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Emails are stored and looked up lower-cased.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
        .is_match(email)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

fn check_email(email: &str, errors: &mut FieldErrors) {
    if email.is_empty() {
        errors.insert("email".into(), "Email is required.".into());
    } else if !is_valid_email(email) {
        errors.insert("email".into(), "Please enter a valid email address.".into());
    }
}

/// Shape checks for the login form. Every problem is reported at once.
pub fn validate_login(email: &str, password: &str) -> Result<Credentials, FieldErrors> {
    let email = normalize_email(email);
    let mut errors = FieldErrors::new();

    check_email(&email, &mut errors);
    if password.is_empty() {
        errors.insert("password".into(), "Password is required.".into());
    }

    if errors.is_empty() {
        Ok(Credentials { email, password: password.to_string() })
    } else {
        Err(errors)
    }
}

pub fn validate_registration(name: &str, email: &str, password: &str, confirm: &str) -> Result<Registration, FieldErrors> {
    let name = name.trim().to_string();
    let email = normalize_email(email);
    let mut errors = FieldErrors::new();

    if name.is_empty() {
        errors.insert("name".into(), "Name is required.".into());
    } else if name.chars().count() < MIN_NAME_LEN {
        errors.insert("name".into(), format!("Name must be at least {MIN_NAME_LEN} characters."));
    }

    check_email(&email, &mut errors);

    if password.is_empty() {
        errors.insert("password".into(), "Password is required.".into());
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.insert("password".into(), format!("Password must be at least {MIN_PASSWORD_LEN} characters."));
    }

    if confirm.is_empty() {
        errors.insert("confirm_password".into(), "Please repeat your password.".into());
    } else if confirm != password {
        errors.insert("confirm_password".into(), "Passwords do not match.".into());
    }

    if errors.is_empty() {
        Ok(Registration { name, email, password: password.to_string() })
    } else {
        Err(errors)
    }
}

pub fn make_jwt_with_days(state: &AppState, user_id: &ObjectId, days: i64) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::days(days)).timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_hex(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.settings.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(e.to_string()))
}

pub fn auth_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(state.settings.jwt_cookie_name.clone(), token);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    if state.settings.cookie_secure {
        cookie.set_secure(true);
    }
    cookie
}

pub fn clear_auth_cookie(state: &AppState) -> Cookie<'static> {
    let mut cookie = Cookie::new(state.settings.jwt_cookie_name.clone(), "");
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.make_removal();
    cookie
}

/// Role granted at registration.
pub fn initial_role(superadmin_email: Option<&str>, email: &str) -> Role {
    match superadmin_email {
        Some(sa) if sa.eq_ignore_ascii_case(email.trim()) => Role::Superadmin,
        _ => Role::User,
    }
}

pub async fn login_user(state: &AppState, email: &str, password: &str) -> Result<User, AppError> {
    let users = state.db.collection::<User>(models::USERS);
    let email = normalize_email(email);

    let user = match users.find_one(doc! { "email": &email }, None).await {
        Ok(Some(u)) => u,
        Ok(None) => return Err(AppError::form("Invalid email or password.")),
        Err(e) => {
            tracing::error!(error = %e, "login lookup failed");
            return Err(AppError::form("Server error. Please try again."));
        }
    };

    if !verify(password, &user.password_hash).unwrap_or(false) {
        return Err(AppError::form("Invalid email or password."));
    }

    let now = Utc::now().timestamp();
    if let Err(e) = users
        .update_one(doc! { "_id": user.id }, doc! { "$set": { "last_login": now } }, None)
        .await
    {
        tracing::warn!(error = %e, user = %user.id, "failed to record last_login");
    }

    activity_service::log_activity(state, user.id, "Logged in").await;
    tracing::info!(user = %user.id, "user logged in");

    Ok(user)
}

pub async fn register_user(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<ObjectId, AppError> {
    let users = state.db.collection::<User>(models::USERS);
    let email = normalize_email(email);

    match users.find_one(doc! { "email": &email }, None).await {
        Ok(Some(_)) => return Err(AppError::field("email", "This email is already in use.")),
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "register lookup failed");
            return Err(AppError::form("There is a problem registering this user!"));
        }
    }

    let pw_hash = hash(password, DEFAULT_COST)
        .map_err(|_| AppError::form("There is a problem registering this user!"))?;

    let coins = models::round2(state.settings.starting_coins);
    let user = User {
        id: ObjectId::new(),
        name: name.trim().to_string(),
        email: email.clone(),
        password_hash: pw_hash,
        role: initial_role(state.settings.superadmin_email.as_deref(), &email),
        coins,
        owned_stocks: Default::default(),
        created_at: Utc::now().timestamp(),
        last_login: None,
    };

    if let Err(e) = users.insert_one(&user, None).await {
        let err = AppError::from(e);
        if err.is_duplicate_key() {
            return Err(AppError::field("email", "This email is already in use."));
        }
        tracing::error!(error = %err, "register insert failed");
        return Err(AppError::form("There is a problem registering this user!"));
    }

    coin_service::record_coin_transaction(state, user.id, LedgerKind::Credit, coins, coins, "Starting balance").await;
    activity_service::log_activity(state, user.id, "Registered").await;
    tracing::info!(user = %user.id, role = %user.role, "user registered");

    Ok(user.id)
}
