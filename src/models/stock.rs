use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stock {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub available_shares: i64,

    #[serde(default)]
    pub last_updated: i64,
}
