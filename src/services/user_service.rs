use std::cmp::Ordering;
use std::collections::HashMap;

use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::FindOptions;
use serde::Serialize;

use crate::{
    errors::AppError,
    models::{self, ActivityLog, CurrentUser, LedgerKind, Role, Stock, User},
    AppState,
};

use super::{activity_service, auth_service, coin_service, coin_service::fmt_ts, portfolio_service};

#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub coins: f64,
    pub holdings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub coins: f64,
    pub holdings_value: f64,
    pub net_worth: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityView {
    pub action: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HoldingEntry {
    pub symbol: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub user: UserRow,
    pub created_at: String,
    pub last_login: Option<String>,
    pub holdings: Vec<HoldingEntry>,
    pub transactions: Vec<portfolio_service::TransactionView>,
    pub activity: Vec<ActivityView>,
}

/// Admin edit form, already parsed.
#[derive(Debug, Clone)]
pub struct UserEdit {
    pub name: String,
    pub email: String,
    pub coins: f64,
}

fn parse_id(id: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id).map_err(|_| AppError::NotFound("User not found."))
}

fn row(u: &User) -> UserRow {
    UserRow {
        id: u.id.to_hex(),
        name: u.name.clone(),
        email: u.email.clone(),
        role: u.role,
        coins: u.coins,
        holdings: u.owned_stocks.values().filter(|q| **q > 0).count(),
    }
}

/// Positive holdings, sorted by symbol.
pub fn live_holdings(owned: &HashMap<String, i64>) -> Vec<HoldingEntry> {
    let mut out: Vec<HoldingEntry> = owned
        .iter()
        .filter(|(_, q)| **q > 0)
        .map(|(s, q)| HoldingEntry { symbol: s.clone(), quantity: *q })
        .collect();
    out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    out
}

pub fn activity_views(logs: Vec<ActivityLog>) -> Vec<ActivityView> {
    logs.into_iter()
        .map(|l| ActivityView {
            action: l.action,
            timestamp: fmt_ts(l.timestamp),
        })
        .collect()
}

pub fn validate_edit(edit: &UserEdit) -> Result<(), AppError> {
    if edit.name.trim().is_empty() {
        return Err(AppError::field("name", "Name is required."));
    }
    if !auth_service::is_valid_email(edit.email.trim()) {
        return Err(AppError::field("email", "Please enter a valid email address."));
    }
    if !edit.coins.is_finite() || edit.coins < 0.0 {
        return Err(AppError::field("coins", "Coins cannot be negative."));
    }
    Ok(())
}

/// Value of a holdings map at current prices.
pub fn holdings_value(holdings: &HashMap<String, i64>, stocks: &HashMap<String, Stock>) -> f64 {
    holdings
        .iter()
        .filter(|(_, q)| **q > 0)
        .map(|(sym, q)| stocks.get(sym).map(|s| s.price).unwrap_or(0.0) * *q as f64)
        .sum()
}

/// Ranks by coins, highest first; ties by name.
pub fn rank_leaderboard(users: &[User], stocks: &HashMap<String, Stock>) -> Vec<LeaderboardRow> {
    let mut sorted: Vec<&User> = users.iter().collect();
    sorted.sort_by(|a, b| {
        b.coins
            .partial_cmp(&a.coins)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, u)| {
            let hv = holdings_value(&u.owned_stocks, stocks);
            LeaderboardRow {
                rank: i + 1,
                id: u.id.to_hex(),
                name: u.name.clone(),
                coins: u.coins,
                holdings_value: hv,
                net_worth: u.coins + hv,
            }
        })
        .collect()
}

pub async fn get_user(state: &AppState, id: ObjectId) -> Result<Option<User>, AppError> {
    let users = state.db.collection::<User>(models::USERS);
    Ok(users.find_one(doc! { "_id": id }, None).await?)
}

async fn all_users(state: &AppState) -> Result<Vec<User>, AppError> {
    let users = state.db.collection::<User>(models::USERS);
    let find_opts = FindOptions::builder().sort(doc! { "name": 1 }).build();
    let mut cursor = users.find(doc! {}, find_opts).await?;

    let mut out = vec![];
    while let Some(res) = cursor.next().await {
        out.push(res?);
    }
    Ok(out)
}

pub async fn list_users(state: &AppState) -> Result<Vec<UserRow>, AppError> {
    Ok(all_users(state).await?.iter().map(row).collect())
}

/// Filter and update for an admin edit. The filter pins the balance the admin
/// saw, so a trade or approval landing in between is never overwritten.
pub fn admin_edit_update(id: ObjectId, seen_coins: f64, edit: &UserEdit) -> (Document, Document) {
    (
        doc! { "_id": id, "coins": seen_coins },
        doc! { "$set": {
            "name": edit.name.trim(),
            "email": edit.email.trim().to_lowercase(),
            "coins": models::round2(edit.coins),
        } },
    )
}

pub async fn admin_update_user(state: &AppState, actor: &CurrentUser, target: &str, edit: &UserEdit) -> Result<(), AppError> {
    let id = parse_id(target)?;
    validate_edit(edit)?;

    let before = get_user(state, id).await?.ok_or(AppError::NotFound("User not found."))?;
    let coins = models::round2(edit.coins);

    let users = state.db.collection::<User>(models::USERS);
    let (filter, update) = admin_edit_update(id, before.coins, edit);
    let res = match users.update_one(filter, update, None).await {
        Ok(r) => r,
        Err(e) => {
            let err = AppError::from(e);
            if err.is_duplicate_key() {
                return Err(AppError::field("email", "This email is already in use."));
            }
            return Err(err);
        }
    };

    if res.matched_count == 0 {
        return match get_user(state, id).await? {
            Some(_) => Err(AppError::form("Balance changed, reload and try again.")),
            None => Err(AppError::NotFound("User not found.")),
        };
    }

    let delta = coins - before.coins;
    if delta.abs() >= coin_service::CENT_TOLERANCE {
        let kind = if delta > 0.0 { LedgerKind::Credit } else { LedgerKind::Debit };
        coin_service::record_coin_transaction(state, id, kind, delta.abs(), coins, "Adjusted by admin").await;
        state.broadcast(&["coinsUpdated"]);
    }

    activity_service::log_activity(state, actor.id, format!("Updated user {}", id.to_hex())).await;
    state.broadcast(&["usersUpdated"]);
    tracing::info!(actor = %actor.id, target = %id, "user updated");
    Ok(())
}

pub async fn set_role(state: &AppState, actor: &CurrentUser, target: &str, role: Role) -> Result<(), AppError> {
    if actor.role != Role::Superadmin {
        return Err(AppError::Forbidden("Only a superadmin can change roles.".into()));
    }
    let id = parse_id(target)?;
    if id == actor.id && role != Role::Superadmin {
        return Err(AppError::form("You cannot demote yourself."));
    }

    let users = state.db.collection::<User>(models::USERS);
    let res = users
        .update_one(doc! { "_id": id }, doc! { "$set": { "role": role.as_str() } }, None)
        .await?;
    if res.matched_count == 0 {
        return Err(AppError::NotFound("User not found."));
    }

    activity_service::log_activity(state, actor.id, format!("Set role of {} to {}", id.to_hex(), role)).await;
    state.broadcast(&["usersUpdated"]);
    tracing::info!(actor = %actor.id, target = %id, role = %role, "role changed");
    Ok(())
}

pub async fn delete_user(state: &AppState, actor: &CurrentUser, target: &str) -> Result<(), AppError> {
    let id = parse_id(target)?;
    if id == actor.id {
        return Err(AppError::form("You cannot delete your own account."));
    }

    let users = state.db.collection::<User>(models::USERS);
    let res = users.delete_one(doc! { "_id": id }, None).await?;
    if res.deleted_count == 0 {
        return Err(AppError::NotFound("User not found."));
    }

    activity_service::log_activity(state, actor.id, format!("Deleted user {}", id.to_hex())).await;
    state.broadcast(&["usersUpdated"]);
    tracing::info!(actor = %actor.id, target = %id, "user deleted");
    Ok(())
}

pub async fn leaderboard(state: &AppState) -> Result<Vec<LeaderboardRow>, AppError> {
    let users = all_users(state).await?;
    let stocks = portfolio_service::stocks_by_symbol(state).await?;
    Ok(rank_leaderboard(&users, &stocks))
}

pub async fn profile_view(state: &AppState, target: &str) -> Result<ProfileView, AppError> {
    let id = parse_id(target)?;
    let user = get_user(state, id).await?.ok_or(AppError::NotFound("User not found."))?;

    let txs = portfolio_service::list_user_transactions(state, id, None, Some(20)).await?;
    let logs = activity_service::list_user_activity(state, id, 20).await?;

    let holdings = live_holdings(&user.owned_stocks);

    Ok(ProfileView {
        user: row(&user),
        created_at: fmt_ts(user.created_at),
        last_login: user.last_login.map(fmt_ts),
        holdings,
        transactions: portfolio_service::transaction_views(txs),
        activity: activity_views(logs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, coins: f64, holdings: &[(&str, i64)]) -> User {
        User {
            id: ObjectId::new(),
            name: name.into(),
            email: format!("{name}@example.com"),
            password_hash: String::new(),
            role: Role::User,
            coins,
            owned_stocks: holdings.iter().map(|(s, q)| (s.to_string(), *q)).collect(),
            created_at: 0,
            last_login: None,
        }
    }

    fn stocks() -> HashMap<String, Stock> {
        HashMap::from([(
            "ACME".to_string(),
            Stock {
                id: ObjectId::new(),
                symbol: "ACME".into(),
                name: "Acme".into(),
                price: 10.0,
                available_shares: 0,
                last_updated: 0,
            },
        )])
    }

    #[test]
    fn leaderboard_ranks_by_coins_then_name() {
        let users = vec![
            user("carol", 50.0, &[("ACME", 100)]),
            user("bob", 200.0, &[]),
            user("alice", 200.0, &[("ACME", 1)]),
        ];
        let rows = rank_leaderboard(&users, &stocks());
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["alice", "bob", "carol"]);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].net_worth, 210.0);
        assert_eq!(rows[2].holdings_value, 1000.0);
    }

    #[test]
    fn holdings_value_skips_unknown_and_empty() {
        let h = HashMap::from([("ACME".to_string(), 3), ("GONE".to_string(), 5), ("ZERO".to_string(), 0)]);
        assert_eq!(holdings_value(&h, &stocks()), 30.0);
    }

    #[test]
    fn edit_validation() {
        let ok = UserEdit { name: "A".into(), email: "a@b.c".into(), coins: 0.0 };
        assert!(validate_edit(&ok).is_ok());

        let e = validate_edit(&UserEdit { coins: -1.0, ..ok.clone() }).unwrap_err();
        assert_eq!(e.field_errors().get("coins").map(String::as_str), Some("Coins cannot be negative."));

        let e = validate_edit(&UserEdit { email: "nope".into(), ..ok.clone() }).unwrap_err();
        assert!(e.field_errors().contains_key("email"));

        let e = validate_edit(&UserEdit { name: " ".into(), ..ok }).unwrap_err();
        assert!(e.field_errors().contains_key("name"));
    }

    #[test]
    fn admin_edit_is_pinned_to_the_seen_balance() {
        let id = ObjectId::new();
        let edit = UserEdit { name: " Ada ".into(), email: " Ada@Example.COM ".into(), coins: 120.004 };
        let (filter, update) = admin_edit_update(id, 100.0, &edit);

        // a trade that moved the balance off 100 makes this match nothing
        assert_eq!(filter, doc! { "_id": id, "coins": 100.0 });
        assert_eq!(
            update,
            doc! { "$set": { "name": "Ada", "email": "ada@example.com", "coins": 120.0 } }
        );
    }

    #[test]
    fn row_counts_only_live_holdings() {
        let u = user("dora", 1.0, &[("ACME", 2), ("OLD", 0)]);
        assert_eq!(row(&u).holdings, 1);
    }

    #[test]
    fn live_holdings_are_sorted_and_positive() {
        let u = user("erin", 1.0, &[("ZED", 1), ("ACME", 4), ("OLD", 0)]);
        let h = live_holdings(&u.owned_stocks);
        assert_eq!(
            h,
            vec![
                HoldingEntry { symbol: "ACME".into(), quantity: 4 },
                HoldingEntry { symbol: "ZED".into(), quantity: 1 },
            ]
        );
    }
}
