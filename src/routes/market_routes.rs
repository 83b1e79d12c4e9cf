use axum::{routing::get, Router};

use crate::{controllers::market_controller, AppState};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/market", get(market_controller::get_market))
        .route("/market/search", get(market_controller::get_search))
        .route("/market/quote/:symbol", get(market_controller::get_quote))
}
