use axum::{
    http::{header, Request, StatusCode},
    routing::post,
    Router,
};
use coinmarket::models::{CurrentUser, Role};
use coinmarket::{
    config,
    controllers::{admin_controller, stock_admin_controller},
    services, templates, AppState,
};
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

fn admin_app(state: AppState) -> Router {
    Router::new()
        .route("/admin/users/:id", post(admin_controller::post_update_user))
        .route("/admin/users/:id/role", post(admin_controller::post_set_role))
        .route("/admin/stocks", post(stock_admin_controller::post_create_stock))
        .with_state(state)
}

#[tokio::test]
async fn set_role_unauthorized_returns_401() {
    let app = admin_app(test_state().await);

    let res = app
        .oneshot(form_post("/admin/users/abc/role", "role=admin"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn set_role_unknown_role_renders_error() {
    let app = admin_app(test_state().await);

    let mut req = form_post("/admin/users/abc/role", "role=overlord");
    req.extensions_mut().insert(test_user(Role::Superadmin));

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_body_string(res).await;
    assert!(body.contains("Unknown role."));
}

#[tokio::test]
async fn update_user_bad_coin_balance_renders_error() {
    let app = admin_app(test_state().await);

    let mut req = form_post("/admin/users/abc", "name=Bob&email=bob%40example.com&coins=many");
    req.extensions_mut().insert(test_user(Role::Admin));

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_body_string(res).await;
    assert!(body.contains("Enter a valid coin balance."));
}

#[tokio::test]
async fn create_stock_invalid_symbol_renders_field_error() {
    let app = admin_app(test_state().await);

    let mut req = form_post("/admin/stocks", "symbol=BAD.SYM&name=Bad&price=10&available_shares=5");
    req.extensions_mut().insert(test_user(Role::Superadmin));

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_body_string(res).await;
    assert!(body.contains("Symbol must be 1-10 letters or digits."));
    assert!(body.contains("is-invalid"));
}

#[tokio::test]
async fn create_stock_non_positive_price_renders_field_error() {
    let app = admin_app(test_state().await);

    let mut req = form_post("/admin/stocks", "symbol=ACME&name=Acme&price=0&available_shares=5");
    req.extensions_mut().insert(test_user(Role::Superadmin));

    let res = app.oneshot(req).await.unwrap();
    let body = response_body_string(res).await;
    assert!(body.contains("Price must be a positive number."));
    // entered values survive the round trip
    assert!(body.contains("value=\"ACME\""));
}
