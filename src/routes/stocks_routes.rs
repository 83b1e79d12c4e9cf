use axum::{routing::get, Router};

use crate::{controllers::stocks_controller, AppState};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/stocks", get(stocks_controller::get_stocks))
        .route("/stocks/table", get(stocks_controller::get_stocks_table))
        .route("/stocks/countdown", get(stocks_controller::get_countdown))
}
