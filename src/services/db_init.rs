use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Database, IndexModel,
};

use crate::models;

async fn ensure(db: &Database, collection: &str, keys: Document, unique: bool) -> Result<(), mongodb::error::Error> {
    let col = db.collection::<Document>(collection);
    let model = if unique {
        IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build()
    } else {
        IndexModel::builder().keys(keys).build()
    };
    col.create_index(model, None).await?;
    Ok(())
}

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // users: unique email
    ensure(db, models::USERS, doc! { "email": 1 }, true).await?;

    // stocks: holdings are keyed by symbol, so it must be unique
    ensure(db, models::STOCKS, doc! { "symbol": 1 }, true).await?;

    // history pages: by user, newest first
    ensure(db, models::TRANSACTIONS, doc! { "user_id": 1, "timestamp": -1 }, false).await?;
    ensure(db, models::COIN_TRANSACTIONS, doc! { "user_id": 1, "created_at": -1 }, false).await?;
    ensure(db, models::ACTIVITY_LOGS, doc! { "user_id": 1, "timestamp": -1 }, false).await?;

    // coin requests: admin tabs and the per-user pending count
    ensure(db, models::COIN_REQUESTS, doc! { "status": 1, "created_at": -1 }, false).await?;
    ensure(db, models::COIN_REQUESTS, doc! { "user_id": 1, "status": 1 }, false).await?;

    Ok(())
}
