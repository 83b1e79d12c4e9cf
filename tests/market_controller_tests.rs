use axum::{
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use coinmarket::{config, controllers::market_controller, services, templates, AppState};
use http_body_util::BodyExt;
use mongodb::Client;
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

fn market_app(state: AppState) -> Router {
    Router::new()
        .route("/market/search", get(market_controller::get_search))
        .route("/market/quote/:symbol", get(market_controller::get_quote))
        .with_state(state)
}

#[tokio::test]
async fn search_without_api_key_shows_friendly_error() {
    let app = market_app(test_state().await);

    let req = Request::builder()
        .uri("/market/search?q=apple")
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_body_string(res).await;
    assert!(body.contains("Market search unavailable right now."));
}

#[tokio::test]
async fn empty_search_renders_nothing_alarming() {
    let app = market_app(test_state().await);

    let req = Request::builder()
        .uri("/market/search?q=")
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    let body = response_body_string(res).await;
    assert!(body.contains("market-results"));
    assert!(!body.contains("alert"));
}

#[tokio::test]
async fn quote_without_api_key_shows_friendly_error() {
    let app = market_app(test_state().await);

    let req = Request::builder()
        .uri("/market/quote/aapl")
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    let body = response_body_string(res).await;
    assert!(body.contains("Quote unavailable right now."));
}
