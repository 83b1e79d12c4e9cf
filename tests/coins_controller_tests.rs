use axum::{
    http::{header, Request, StatusCode},
    routing::post,
    Router,
};
use coinmarket::models::{CurrentUser, Role};
use coinmarket::{config, controllers::coins_controller, services, templates, AppState};
use http_body_util::BodyExt;
use mongodb::{bson::oid::ObjectId, Client};
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

async fn response_body_string(res: axum::response::Response) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}

fn test_user(role: Role) -> CurrentUser {
    CurrentUser {
        id: ObjectId::new(),
        name: "test".to_string(),
        email: "test@example.com".to_string(),
        role,
    }
}

fn form_post(uri: &str, body: &'static str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(axum::body::Body::from(body))
        .unwrap()
}

fn coins_app(state: AppState) -> Router {
    Router::new()
        .route("/coins/request", post(coins_controller::post_request))
        .with_state(state)
}

#[tokio::test]
async fn post_request_unauthorized_returns_401() {
    let app = coins_app(test_state().await);

    let res = app
        .oneshot(form_post("/coins/request", "coin_amount=100&reason=please"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_request_non_numeric_amount_renders_error() {
    let app = coins_app(test_state().await);

    let mut req = form_post("/coins/request", "coin_amount=lots&reason=please");
    req.extensions_mut().insert(test_user(Role::User));

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_body_string(res).await;
    assert!(body.contains("Please enter a valid coin amount"));
    // the reason the user typed is kept
    assert!(body.contains("please"));
}

#[tokio::test]
async fn post_request_zero_amount_renders_error() {
    let app = coins_app(test_state().await);

    let mut req = form_post("/coins/request", "coin_amount=0&reason=please");
    req.extensions_mut().insert(test_user(Role::User));

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_body_string(res).await;
    assert!(body.contains("Please enter a valid coin amount"));
}

#[tokio::test]
async fn post_request_blank_reason_renders_error() {
    let app = coins_app(test_state().await);

    let mut req = form_post("/coins/request", "coin_amount=250&reason=+++");
    req.extensions_mut().insert(test_user(Role::User));

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("HX-Trigger").is_none());

    let body = response_body_string(res).await;
    assert!(body.contains("Please provide a reason for your request"));
}
