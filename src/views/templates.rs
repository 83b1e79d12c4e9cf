use std::sync::Arc;

use handlebars::{handlebars_helper, Handlebars};

pub type Hbs = Arc<Handlebars<'static>>;

const TEMPLATES: &[(&str, &str)] = &[
    ("layouts/base", include_str!("../../templates/layouts/base.hbs")),
    ("partials/navbar", include_str!("../../templates/partials/navbar.hbs")),
    ("partials/flash", include_str!("../../templates/partials/flash.hbs")),
    ("partials/stocks_table", include_str!("../../templates/partials/stocks_table.hbs")),
    ("partials/countdown", include_str!("../../templates/partials/countdown.hbs")),
    ("partials/trade_panel", include_str!("../../templates/partials/trade_panel.hbs")),
    ("partials/coin_request_form", include_str!("../../templates/partials/coin_request_form.hbs")),
    ("partials/coin_requests_table", include_str!("../../templates/partials/coin_requests_table.hbs")),
    ("partials/admin_requests_table", include_str!("../../templates/partials/admin_requests_table.hbs")),
    ("partials/admin_users_table", include_str!("../../templates/partials/admin_users_table.hbs")),
    ("partials/admin_stocks_table", include_str!("../../templates/partials/admin_stocks_table.hbs")),
    ("partials/stock_form", include_str!("../../templates/partials/stock_form.hbs")),
    ("partials/market_results", include_str!("../../templates/partials/market_results.hbs")),
    ("partials/market_quote", include_str!("../../templates/partials/market_quote.hbs")),
    ("pages/home", include_str!("../../templates/pages/home.hbs")),
    ("pages/login", include_str!("../../templates/pages/login.hbs")),
    ("pages/register", include_str!("../../templates/pages/register.hbs")),
    ("pages/dashboard", include_str!("../../templates/pages/dashboard.hbs")),
    ("pages/stocks", include_str!("../../templates/pages/stocks.hbs")),
    ("pages/trade", include_str!("../../templates/pages/trade.hbs")),
    ("pages/portfolio", include_str!("../../templates/pages/portfolio.hbs")),
    ("pages/transactions", include_str!("../../templates/pages/transactions.hbs")),
    ("pages/coins_request", include_str!("../../templates/pages/coins_request.hbs")),
    ("pages/coins_requests", include_str!("../../templates/pages/coins_requests.hbs")),
    ("pages/coins_history", include_str!("../../templates/pages/coins_history.hbs")),
    ("pages/activity", include_str!("../../templates/pages/activity.hbs")),
    ("pages/market", include_str!("../../templates/pages/market.hbs")),
    ("pages/admin_users", include_str!("../../templates/pages/admin_users.hbs")),
    ("pages/admin_requests", include_str!("../../templates/pages/admin_requests.hbs")),
    ("pages/admin_stocks", include_str!("../../templates/pages/admin_stocks.hbs")),
    ("pages/leaderboard", include_str!("../../templates/pages/leaderboard.hbs")),
    ("pages/user_profile", include_str!("../../templates/pages/user_profile.hbs")),
    ("pages/forbidden", include_str!("../../templates/pages/forbidden.hbs")),
    ("pages/not_found", include_str!("../../templates/pages/not_found.hbs")),
];

/// `1234567.891` -> `1,234,567.89`
pub fn format_money(v: f64) -> String {
    if !v.is_finite() {
        return "0.00".to_string();
    }

    let fixed = format!("{:.2}", v.abs());
    let (int_part, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if v < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

handlebars_helper!(money: |v: f64| format_money(v));
handlebars_helper!(eq: |a: Json, b: Json| a == b);

pub fn build_handlebars() -> Hbs {
    let mut hb = Handlebars::new();
    hb.register_helper("money", Box::new(money));
    hb.register_helper("eq", Box::new(eq));

    for (name, src) in TEMPLATES {
        if let Err(e) = hb.register_template_string(name, *src) {
            tracing::error!(template = %name, error = %e, "template failed to compile");
        }
    }

    Arc::new(hb)
}
