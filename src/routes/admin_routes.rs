use axum::{routing::{get, post}, Router};

use crate::{
    controllers::{admin_controller, stock_admin_controller},
    AppState,
};

// role checks live in auth::required_role
pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/admin/users", get(admin_controller::get_users))
        .route("/admin/users/:id", post(admin_controller::post_update_user))
        .route("/admin/users/:id/delete", post(admin_controller::post_delete_user))
        .route("/admin/users/:id/role", post(admin_controller::post_set_role))
        .route("/admin/coin-requests", get(admin_controller::get_coin_requests))
        .route("/admin/coin-requests/:id/approve", post(admin_controller::post_approve))
        .route("/admin/coin-requests/:id/reject", post(admin_controller::post_reject))
        .route(
            "/admin/stocks",
            get(stock_admin_controller::get_stocks).post(stock_admin_controller::post_create_stock),
        )
        .route("/admin/stocks/table", get(stock_admin_controller::get_stocks_table))
        .route("/admin/stocks/:id", post(stock_admin_controller::post_update_stock))
        .route("/admin/stocks/:id/delete", post(stock_admin_controller::post_delete_stock))
        .route("/leaderboard", get(admin_controller::get_leaderboard))
        .route("/users/:id", get(admin_controller::get_user_profile))
}
