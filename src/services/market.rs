//! Read-only lookup of real market symbols and quotes (Finnhub).
//!
//! This is reference data for players; it never feeds simulated prices.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::AppError;

const BASE_URL: &str = "https://finnhub.io/api/v1";
const MAX_RESULTS: usize = 10;

#[derive(Clone)]
pub struct MarketClient {
    http: Client,
    api_key: String,
}

impl MarketClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::new(),
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, params: &[(&str, &str)]) -> Result<T, AppError> {
        if !self.is_configured() {
            return Err(AppError::Market("FINNHUB_API_KEY is not set".to_string()));
        }

        let res = self
            .http
            .get(format!("{BASE_URL}{path}"))
            .query(params)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Market(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(AppError::Market(format!("{path} returned {status}")));
        }

        res.json::<T>().await.map_err(|e| AppError::Market(e.to_string()))
    }

    pub async fn search(&self, q: &str) -> Result<SearchResponse, AppError> {
        self.get("/search", &[("q", q)]).await
    }

    pub async fn quote(&self, symbol: &str) -> Result<QuoteResponse, AppError> {
        self.get("/quote", &[("symbol", symbol)]).await
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub result: Vec<SearchItem>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchItem {
    pub description: String,

    #[serde(rename = "displaySymbol")]
    pub display_symbol: String,

    pub symbol: String,

    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuoteResponse {
    // current
    pub c: f64,
    // change
    pub d: Option<f64>,
    // percent change
    pub dp: Option<f64>,
    pub h: f64,
    pub l: f64,
    pub o: f64,
    // previous close
    pub pc: f64,
}

/// Keeps non-empty symbols, at most ten.
pub fn trim_results(resp: SearchResponse) -> Vec<SearchItem> {
    resp.result
        .into_iter()
        .filter(|it| !it.symbol.trim().is_empty())
        .take(MAX_RESULTS)
        .collect()
}

/// Context for `partials/market_results`.
pub async fn search_ctx(client: &MarketClient, query: &str) -> serde_json::Value {
    let q = query.trim();

    if q.is_empty() {
        return json!({ "query": "", "results": null, "error": null });
    }

    match client.search(q).await {
        Ok(resp) => {
            let results = trim_results(resp);
            let results_val = if results.is_empty() {
                serde_json::Value::Null
            } else {
                json!(results)
            };

            json!({ "query": q, "results": results_val, "error": null })
        }
        Err(e) => {
            tracing::warn!(error = %e, query = %q, "market search failed");
            json!({ "query": q, "results": null, "error": "Market search unavailable right now." })
        }
    }
}

/// Context for `partials/market_quote`.
pub async fn quote_ctx(client: &MarketClient, symbol: &str) -> serde_json::Value {
    let sym = symbol.trim().to_uppercase();
    match client.quote(&sym).await {
        Ok(q) => json!({ "symbol": sym, "quote": q, "error": null }),
        Err(e) => {
            tracing::warn!(error = %e, symbol = %sym, "market quote failed");
            json!({ "symbol": sym, "quote": null, "error": "Quote unavailable right now." })
        }
    }
}
