use std::collections::HashMap;

use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use serde::Serialize;

use crate::{
    errors::AppError,
    models::{self, CoinRequest, CoinTransaction, CurrentUser, LedgerKind, RequestStatus, User},
    AppState,
};

use super::activity_service;

#[derive(Debug, Clone, Serialize)]
pub struct CoinRequestView {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub coin_amount: f64,
    pub reason: String,
    pub status: &'static str,
    pub is_pending: bool,
    pub created_at: String,
    pub admin_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
    pub kind: LedgerKind,
    pub amount: f64,
    pub balance_after: f64,
    pub reason: String,
    pub created_at: String,
}

pub fn fmt_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Half a cent. Stored balances are whole cents, so comparing against
/// `amount - CENT_TOLERANCE` is a comparison at cent precision.
pub const CENT_TOLERANCE: f64 = 0.005;

/// Pipeline update adding `delta` to `coins`, with the stored result rounded
/// to cents. `extra` fields are set in the same stage.
pub fn balance_update(delta: f64, extra: Document) -> Vec<Document> {
    let mut set = doc! {
        "coins": { "$round": [{ "$add": ["$coins", models::round2(delta)] }, 2] }
    };
    for (k, v) in extra {
        set.insert(k, v);
    }
    vec![doc! { "$set": set }]
}

/// Filter matching `user_id` only while the balance covers `amount`.
pub fn covers_filter(user_id: ObjectId, amount: f64) -> Document {
    doc! { "_id": user_id, "coins": { "$gte": models::round2(amount) - CENT_TOLERANCE } }
}

/// Filter and update that move a request out of `pending`. The status in the
/// filter makes the transition happen at most once with concurrent admins.
pub fn decision_update(
    request_id: ObjectId,
    decision: RequestStatus,
    admin_id: ObjectId,
    now: i64,
) -> (Document, Document) {
    (
        doc! { "_id": request_id, "status": RequestStatus::Pending.as_str() },
        doc! { "$set": { "status": decision.as_str(), "admin_id": admin_id, "updated_at": now } },
    )
}

/// Checks a coin request before anything is written.
pub fn validate_request(amount: f64, reason: &str, pending: u64, max_pending: u64) -> Result<(), AppError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::field("coin_amount", "Please enter a valid coin amount"));
    }
    if reason.trim().is_empty() {
        return Err(AppError::field("reason", "Please provide a reason for your request"));
    }
    if pending >= max_pending {
        return Err(AppError::form(format!(
            "You can only have {max_pending} pending requests at a time"
        )));
    }
    Ok(())
}

pub async fn record_coin_transaction(
    state: &AppState,
    user_id: ObjectId,
    kind: LedgerKind,
    amount: f64,
    balance_after: f64,
    reason: &str,
) {
    let entry = CoinTransaction {
        id: ObjectId::new(),
        user_id,
        kind,
        amount: models::round2(amount),
        balance_after: models::round2(balance_after),
        reason: reason.to_string(),
        created_at: Utc::now().timestamp(),
    };

    let col = state.db.collection::<CoinTransaction>(models::COIN_TRANSACTIONS);
    if let Err(e) = col.insert_one(&entry, None).await {
        tracing::warn!(error = %e, user = %user_id, "failed to write coin ledger entry");
    }
}

pub async fn pending_count(state: &AppState, user_id: ObjectId) -> Result<u64, AppError> {
    let requests = state.db.collection::<CoinRequest>(models::COIN_REQUESTS);
    let n = requests
        .count_documents(doc! { "user_id": user_id, "status": RequestStatus::Pending.as_str() }, None)
        .await?;
    Ok(n)
}

pub async fn send_request(state: &AppState, user_id: ObjectId, amount: f64, reason: &str) -> Result<CoinRequest, AppError> {
    // cheap checks first so bad input never touches the database
    validate_request(amount, reason, 0, u64::MAX)?;

    let pending = pending_count(state, user_id).await?;
    validate_request(amount, reason, pending, state.settings.max_pending_requests)?;

    let amount = models::round2(amount);
    let req = CoinRequest {
        id: ObjectId::new(),
        user_id,
        coin_amount: amount,
        reason: reason.trim().to_string(),
        status: RequestStatus::Pending,
        created_at: Utc::now().timestamp(),
        updated_at: None,
        admin_id: None,
    };

    let requests = state.db.collection::<CoinRequest>(models::COIN_REQUESTS);
    requests.insert_one(&req, None).await?;

    activity_service::log_activity(state, user_id, format!("Requested {amount:.2} coins")).await;
    state.broadcast(&["coinRequestsUpdated"]);
    tracing::info!(user = %user_id, amount, "coin request submitted");

    Ok(req)
}

async fn names_for(state: &AppState, ids: Vec<ObjectId>) -> Result<HashMap<ObjectId, String>, AppError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users = state.db.collection::<User>(models::USERS);
    let mut cursor = users.find(doc! { "_id": { "$in": ids } }, None).await?;

    let mut out = HashMap::new();
    while let Some(res) = cursor.next().await {
        let u = res?;
        out.insert(u.id, u.name);
    }
    Ok(out)
}

async fn find_requests(state: &AppState, filter: Document) -> Result<Vec<CoinRequest>, AppError> {
    let requests = state.db.collection::<CoinRequest>(models::COIN_REQUESTS);
    let find_opts = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let mut cursor = requests.find(filter, find_opts).await?;

    let mut out = vec![];
    while let Some(res) = cursor.next().await {
        out.push(res?);
    }
    Ok(out)
}

fn to_view(r: CoinRequest, names: &HashMap<ObjectId, String>) -> CoinRequestView {
    CoinRequestView {
        id: r.id.to_hex(),
        user_id: r.user_id.to_hex(),
        user_name: names.get(&r.user_id).cloned().unwrap_or_else(|| "Unknown User".to_string()),
        coin_amount: r.coin_amount,
        reason: r.reason,
        status: r.status.as_str(),
        is_pending: r.status == RequestStatus::Pending,
        created_at: fmt_ts(r.created_at),
        admin_name: r
            .admin_id
            .map(|a| names.get(&a).cloned().unwrap_or_else(|| "Unknown Admin".to_string())),
    }
}

pub async fn list_user_requests(state: &AppState, user_id: ObjectId) -> Result<Vec<CoinRequestView>, AppError> {
    let reqs = find_requests(state, doc! { "user_id": user_id }).await?;

    let mut ids: Vec<ObjectId> = reqs.iter().filter_map(|r| r.admin_id).collect();
    ids.push(user_id);
    ids.sort();
    ids.dedup();
    let names = names_for(state, ids).await?;

    Ok(reqs.into_iter().map(|r| to_view(r, &names)).collect())
}

/// All requests for the admin screen, optionally filtered by status.
pub async fn list_requests(state: &AppState, status: Option<RequestStatus>) -> Result<Vec<CoinRequestView>, AppError> {
    let filter = match status {
        Some(s) => doc! { "status": s.as_str() },
        None => doc! {},
    };
    let reqs = find_requests(state, filter).await?;

    let mut ids: Vec<ObjectId> = reqs
        .iter()
        .flat_map(|r| std::iter::once(r.user_id).chain(r.admin_id))
        .collect();
    ids.sort();
    ids.dedup();
    let names = names_for(state, ids).await?;

    Ok(reqs.into_iter().map(|r| to_view(r, &names)).collect())
}

pub async fn decide_request(
    state: &AppState,
    request_id: &str,
    decision: RequestStatus,
    admin: &CurrentUser,
) -> Result<CoinRequest, AppError> {
    if decision == RequestStatus::Pending {
        return Err(AppError::form("Invalid decision."));
    }
    let id = ObjectId::parse_str(request_id).map_err(|_| AppError::NotFound("Request not found."))?;

    let requests = state.db.collection::<CoinRequest>(models::COIN_REQUESTS);
    let now = Utc::now().timestamp();
    let opts = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let (filter, update) = decision_update(id, decision, admin.id, now);
    let updated = requests.find_one_and_update(filter, update, opts).await?;

    let Some(req) = updated else {
        return match requests.find_one(doc! { "_id": id }, None).await? {
            Some(_) => Err(AppError::form("Request already processed.")),
            None => Err(AppError::NotFound("Request not found.")),
        };
    };

    if decision == RequestStatus::Approved {
        let users = state.db.collection::<User>(models::USERS);
        let opts = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        match users
            .find_one_and_update(doc! { "_id": req.user_id }, balance_update(req.coin_amount, doc! {}), opts)
            .await?
        {
            Some(u) => {
                record_coin_transaction(state, u.id, LedgerKind::Credit, req.coin_amount, u.coins, "Coin request approved").await;
                activity_service::log_activity(
                    state,
                    u.id,
                    format!("Coin request for {:.2} coins approved", req.coin_amount),
                )
                .await;
            }
            None => {
                tracing::warn!(request = %req.id, user = %req.user_id, "approved request for a user that no longer exists");
            }
        }
    } else {
        activity_service::log_activity(
            state,
            req.user_id,
            format!("Coin request for {:.2} coins rejected", req.coin_amount),
        )
        .await;
    }

    activity_service::log_activity(
        state,
        admin.id,
        format!("{} coin request {}", if decision == RequestStatus::Approved { "Approved" } else { "Rejected" }, req.id.to_hex()),
    )
    .await;

    state.broadcast(&["coinRequestsUpdated", "coinsUpdated"]);
    tracing::info!(request = %req.id, admin = %admin.id, status = decision.as_str(), "coin request decided");

    Ok(req)
}

pub async fn coin_history(state: &AppState, user_id: ObjectId) -> Result<Vec<LedgerView>, AppError> {
    let col = state.db.collection::<CoinTransaction>(models::COIN_TRANSACTIONS);
    let find_opts = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let mut cursor = col.find(doc! { "user_id": user_id }, find_opts).await?;

    let mut out = vec![];
    while let Some(res) = cursor.next().await {
        let t = res?;
        out.push(LedgerView {
            kind: t.kind,
            amount: t.amount,
            balance_after: t.balance_after,
            reason: t.reason,
            created_at: fmt_ts(t.created_at),
        });
    }
    Ok(out)
}
