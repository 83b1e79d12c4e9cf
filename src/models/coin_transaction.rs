use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Credit,
    Debit,
}

/// One entry of a user's coin ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinTransaction {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: ObjectId,

    #[serde(rename = "type")]
    pub kind: LedgerKind,

    pub amount: f64,
    pub balance_after: f64,
    pub reason: String,
    pub created_at: i64,
}
