pub mod market;
pub mod db_init;
pub mod price_ticker;

pub mod auth_service;
pub mod activity_service;
pub mod coin_service;
pub mod stock_service;
pub mod trading_service;
pub mod portfolio_service;
pub mod user_service;
