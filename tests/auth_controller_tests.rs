use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use mongodb::Client;
use serde_json::json;
use coinmarket::{config, controllers::auth_controller, services, templates, AppState};
use tower::ServiceExt;

async fn test_state() -> AppState {
    let mut settings = config::load();
    settings.finnhub_api_key = String::new();

    let client = Client::with_uri_str(&settings.mongodb_uri)
        .await
        .expect("mongodb client");
    let db = client.database(&settings.mongodb_db);

    let market = services::market::MarketClient::new(settings.finnhub_api_key.clone());
    let (events_tx, _events_rx) = tokio::sync::broadcast::channel::<String>(16);

    AppState {
        hbs: templates::build_handlebars(),
        db,
        settings,
        market,
        events_tx,
    }
}

async fn auth_app() -> Router {
    Router::new()
        .route("/login", get(auth_controller::get_login).post(auth_controller::post_login))
        .route("/register", get(auth_controller::get_register).post(auth_controller::post_register))
        .with_state(test_state().await)
}

async fn post_form(uri: &str, form: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();

    let res = auth_app().await.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

#[tokio::test]
async fn register_echoes_the_lowercased_email() {
    let (status, body) = post_form(
        "/register",
        "name=New+Trader&email=New.Trader%40Example.COM&password=secret1&confirm_password=secret2",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Passwords do not match."));
    assert!(body.contains(r#"value="new.trader@example.com""#));
    assert!(body.contains(r#"value="New Trader""#));
    assert!(!body.contains("New.Trader@Example.COM"));
}

#[tokio::test]
async fn register_reports_every_broken_rule_at_once() {
    let (status, body) = post_form("/register", "name=A&email=nope&password=123&confirm_password=123").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Name must be at least 2 characters."));
    assert!(body.contains("Please enter a valid email address."));
    assert!(body.contains("Password must be at least 6 characters."));
    assert!(!body.contains("Passwords do not match."));
}

#[tokio::test]
async fn register_without_confirmation_asks_for_it() {
    let (_, body) = post_form("/register", "name=Ada&email=ada%40example.com&password=secret1").await;
    assert!(body.contains("Please repeat your password."));
}

#[tokio::test]
async fn login_shape_errors_never_reach_the_database() {
    let (status, body) = post_form("/login", "email=&password=").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Email is required."));
    assert!(body.contains("Password is required."));

    let (_, body) = post_form("/login", "email=Trader%40&password=secret1").await;
    assert!(body.contains("Please enter a valid email address."));
    assert!(body.contains(r#"value="trader@""#));
    assert!(!body.contains("Password is required."));
}

#[tokio::test]
async fn form_level_errors_render_as_a_flash() {
    let hbs = templates::build_handlebars();
    let ctx = json!({
        "values": { "email": "trader@example.com" },
        "errors": { "_form": "Invalid email or password." },
    });

    for tpl in ["pages/login", "pages/register"] {
        let html = hbs.render(tpl, &ctx).unwrap();
        assert!(html.contains("alert alert-danger"), "{tpl} has no flash");
        assert!(html.contains("Invalid email or password."));
        assert!(!html.contains("is-invalid"), "{tpl} marked a field invalid");
    }
}

#[tokio::test]
async fn get_login_renders_full_page_or_fragment() {
    let app = auth_app().await;

    let req = Request::builder().uri("/login").body(Body::empty()).unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8_lossy(&bytes);
    assert!(body.contains("<html"));
    assert!(body.contains(r#"name="email""#));

    let req = Request::builder()
        .uri("/login")
        .header("HX-Request", "true")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8_lossy(&bytes);
    assert!(!body.contains("<html"));
    assert!(body.contains(r#"name="password""#));
}
