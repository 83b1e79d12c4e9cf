use std::net::{IpAddr, SocketAddr};

use mongodb::Client;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coinmarket::{config, routes, services, templates, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coinmarket=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = config::load();

    let client = Client::with_uri_str(&settings.mongodb_uri).await?;
    let db = client.database(&settings.mongodb_db);

    services::db_init::ensure_indexes(&db).await?;

    let market = services::market::MarketClient::new(settings.finnhub_api_key.clone());
    if !market.is_configured() {
        tracing::warn!("FINNHUB_API_KEY not set, market lookup will be unavailable");
    }

    let (events_tx, _events_rx) = tokio::sync::broadcast::channel::<String>(256);

    let state = AppState {
        hbs: templates::build_handlebars(),
        db,
        market,
        settings: settings.clone(),
        events_tx,
    };

    services::price_ticker::spawn_price_ticker(state.clone());

    let app = routes::app(state);

    let addr = SocketAddr::from((settings.host.parse::<IpAddr>()?, settings.port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
