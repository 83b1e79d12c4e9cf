//! Library entrypoint for CoinMarket.
//!
//! The binary only wires settings, the database and the background ticker;
//! everything else lives here so integration tests under `tests/` can build
//! an `AppState` and drive controllers directly.

pub mod config;
pub mod errors;
pub mod models;

#[path = "middleware/auth.rs"]
pub mod auth;

pub mod services;

#[path = "views/render.rs"]
pub mod render;
#[path = "views/templates.rs"]
pub mod templates;

pub mod controllers;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub hbs: templates::Hbs,
    pub db: mongodb::Database,
    pub settings: config::Settings,
    pub market: services::market::MarketClient,
    pub events_tx: tokio::sync::broadcast::Sender<String>,
}

impl AppState {
    /// Fans event names out to every open `/events` stream. Having no
    /// subscribers is not an error.
    pub fn broadcast(&self, events: &[&str]) {
        for ev in events {
            let _ = self.events_tx.send((*ev).to_string());
        }
    }
}
