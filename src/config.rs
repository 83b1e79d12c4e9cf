use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Settings {
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub host: String,
    pub port: u16,

    pub jwt_secret: String,
    pub jwt_cookie_name: String,
    pub cookie_secure: bool,

    pub starting_coins: f64,
    pub max_pending_requests: u64,
    pub superadmin_email: Option<String>,

    pub price_update_secs: u64,
    pub price_min_pct: f64,
    pub price_max_pct: f64,
    pub price_floor: f64,

    pub finnhub_api_key: String,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Orders the jitter band so `min <= max` and both are non-negative.
fn normalize_band(min: f64, max: f64) -> (f64, f64) {
    let min = if min.is_finite() { min.max(0.0) } else { 1.0 };
    let max = if max.is_finite() { max.max(0.0) } else { 5.0 };
    if min > max { (max, min) } else { (min, max) }
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    let mongodb_uri = env::var("MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

    let mongodb_db = env::var("MONGODB_DB")
        .unwrap_or_else(|_| "coinmarket".to_string());

    let host = env::var("HOST")
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    let port = parse_or("PORT", 3000u16);

    let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| "change-me-dev-secret".to_string());
    let jwt_cookie_name = env::var("JWT_COOKIE_NAME").unwrap_or_else(|_| "auth".to_string());
    let cookie_secure = env::var("COOKIE_SECURE")
        .ok()
        .and_then(|s| parse_bool(&s))
        .unwrap_or(false);

    let starting_coins = parse_or("STARTING_COINS", 100_000.0f64);
    let starting_coins = if starting_coins.is_finite() && starting_coins >= 0.0 {
        starting_coins
    } else {
        100_000.0
    };

    let max_pending_requests = parse_or("MAX_PENDING_REQUESTS", 3u64);

    let superadmin_email = env::var("SUPERADMIN_EMAIL")
        .ok()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let price_update_secs = parse_or("PRICE_UPDATE_SECS", 600u64).max(1);
    let (price_min_pct, price_max_pct) =
        normalize_band(parse_or("PRICE_MIN_PCT", 1.0), parse_or("PRICE_MAX_PCT", 5.0));
    let price_floor = parse_or("PRICE_FLOOR", 1.0f64);
    let price_floor = if price_floor.is_finite() && price_floor > 0.0 { price_floor } else { 1.0 };

    let finnhub_api_key = env::var("FINNHUB_API_KEY").unwrap_or_default();

    Settings {
        mongodb_uri,
        mongodb_db,
        host,
        port,
        jwt_secret,
        jwt_cookie_name,
        cookie_secure,
        starting_coins,
        max_pending_requests,
        superadmin_email,
        price_update_secs,
        price_min_pct,
        price_max_pct,
        price_floor,
        finnhub_api_key,
    }
}
