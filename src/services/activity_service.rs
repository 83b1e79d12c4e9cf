use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::FindOptions;

use crate::{errors::AppError, models::{self, ActivityLog}, AppState};

/// Appends an activity entry. Best effort: a failed write is logged and
/// swallowed so it never fails the action being recorded.
pub async fn log_activity(state: &AppState, user_id: ObjectId, action: impl Into<String>) {
    let entry = ActivityLog {
        id: ObjectId::new(),
        user_id,
        action: action.into(),
        timestamp: Utc::now().timestamp(),
    };

    let logs = state.db.collection::<ActivityLog>(models::ACTIVITY_LOGS);
    if let Err(e) = logs.insert_one(&entry, None).await {
        tracing::warn!(error = %e, user = %user_id, action = %entry.action, "failed to write activity log");
    }
}

pub async fn list_user_activity(state: &AppState, user_id: ObjectId, limit: i64) -> Result<Vec<ActivityLog>, AppError> {
    let logs = state.db.collection::<ActivityLog>(models::ACTIVITY_LOGS);
    let find_opts = FindOptions::builder()
        .sort(doc! { "timestamp": -1 })
        .limit(limit)
        .build();

    let mut cursor = logs.find(doc! { "user_id": user_id }, find_opts).await?;

    let mut out = vec![];
    while let Some(res) = cursor.next().await {
        out.push(res?);
    }
    Ok(out)
}
