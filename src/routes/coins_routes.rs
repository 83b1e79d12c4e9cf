use axum::{routing::get, Router};

use crate::{controllers::coins_controller, AppState};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/coins/request", get(coins_controller::get_request_form).post(coins_controller::post_request))
        .route("/coins/requests", get(coins_controller::get_my_requests))
        .route("/coins/history", get(coins_controller::get_history))
        .route("/activity", get(coins_controller::get_activity))
}
