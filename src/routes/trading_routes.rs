use axum::{routing::{get, post}, Router};

use crate::{controllers::trading_controller, AppState};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/trade/:symbol", get(trading_controller::get_trade_page))
        .route("/trade/:symbol/panel", get(trading_controller::get_trade_panel))
        .route("/trade/:symbol/buy", post(trading_controller::post_trade_buy))
        .route("/trade/:symbol/sell", post(trading_controller::post_trade_sell))
}
