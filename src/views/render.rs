use serde_json::json;

use crate::{models::CurrentUser, AppState};

fn user_ctx(user: Option<&CurrentUser>) -> (bool, serde_json::Value) {
    match user {
        Some(u) => (
            true,
            json!({
                "id": u.id.to_hex(),
                "name": u.name,
                "email": u.email,
                "role": u.role,
                "is_admin": u.role.is_admin(),
                "is_superadmin": u.role == crate::models::Role::Superadmin,
            }),
        ),
        None => (false, serde_json::Value::Null),
    }
}

/// Wraps a rendered page body in `layouts/base`.
pub fn render_full(
    state: &AppState,
    title: &str,
    body_html: String,
    user: Option<&CurrentUser>,
) -> Result<String, String> {
    let (is_logged_in, user_json) = user_ctx(user);

    let ctx = json!({
        "title": title,
        "body": body_html,
        "is_logged_in": is_logged_in,
        "user": user_json,
    });

    state
        .hbs
        .render("layouts/base", &ctx)
        .map_err(|e| e.to_string())
}
