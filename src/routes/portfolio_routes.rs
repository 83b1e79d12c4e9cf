use axum::{routing::get, Router};

use crate::{controllers::portfolio_controller, AppState};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/portfolio", get(portfolio_controller::get_portfolio))
        .route("/transactions", get(portfolio_controller::get_transactions))
}
