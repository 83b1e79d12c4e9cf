pub mod user;
pub mod stock;
pub mod transaction;
pub mod coin_request;
pub mod coin_transaction;
pub mod activity_log;

pub use user::{CurrentUser, Role, User};
pub use stock::Stock;
pub use transaction::{TradeSide, Transaction};
pub use coin_request::{CoinRequest, RequestStatus};
pub use coin_transaction::{CoinTransaction, LedgerKind};
pub use activity_log::ActivityLog;

// collection names
pub const USERS: &str = "users";
pub const STOCKS: &str = "stocks";
pub const TRANSACTIONS: &str = "transactions";
pub const COIN_REQUESTS: &str = "coinRequests";
pub const COIN_TRANSACTIONS: &str = "coinTransactions";
pub const ACTIVITY_LOGS: &str = "activity_logs";
pub const SETTINGS: &str = "settings";

/// Rounds money to cents.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
