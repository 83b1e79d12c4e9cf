use axum::{routing::get, Router};

use crate::{controllers::dashboard_controller, AppState};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/dashboard", get(dashboard_controller::get_dashboard))
        .route("/me", get(dashboard_controller::me))
}
