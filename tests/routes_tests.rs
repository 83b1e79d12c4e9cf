use axum::http::{header, Request, StatusCode};
use coinmarket::{config, routes, services, templates, AppState};
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

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder().uri(uri).body(axum::body::Body::empty()).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = routes::app(test_state().await);

    let res = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(response_body_string(res).await, "ok");
}

#[tokio::test]
async fn landing_page_is_public() {
    let app = routes::app(test_state().await);

    let res = app.oneshot(get("/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = response_body_string(res).await;
    assert!(body.contains("CoinMarket"));
    assert!(body.contains("100,000.00"));
}

#[tokio::test]
async fn protected_page_redirects_to_login() {
    let app = routes::app(test_state().await);

    let res = app.oneshot(get("/dashboard")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/login");
}

#[tokio::test]
async fn htmx_request_gets_hx_redirect() {
    let app = routes::app(test_state().await);

    let req = Request::builder()
        .uri("/portfolio")
        .header("HX-Request", "true")
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("HX-Redirect").unwrap(), "/login");
}

#[tokio::test]
async fn event_stream_requires_login() {
    let app = routes::app(test_state().await);

    let res = app.oneshot(get("/events")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_pages_redirect_anonymous_users() {
    let app = routes::app(test_state().await);

    for path in ["/admin/users", "/admin/stocks", "/leaderboard"] {
        let res = app.clone().oneshot(get(path)).await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER, "{path}");
    }
}

#[tokio::test]
async fn forged_session_cookie_is_ignored() {
    let state = test_state().await;
    let cookie = format!("{}=not-a-jwt", state.settings.jwt_cookie_name);
    let app = routes::app(state);

    let req = Request::builder()
        .uri("/dashboard")
        .header(header::COOKIE, cookie)
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
}
