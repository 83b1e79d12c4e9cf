use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::UpdateOptions;
use rand::Rng;
use tokio::time;

use crate::{
    errors::AppError,
    models::{self, Stock},
    AppState,
};

const SETTINGS_ID: &str = "priceUpdate";

/// Bounds of a single price move, in percent.
#[derive(Debug, Clone, Copy)]
pub struct JitterBand {
    pub min_pct: f64,
    pub max_pct: f64,
}

/// One random-walk step: move `current` by a uniform `[min_pct, max_pct]`
/// percent, up or down with equal odds, never below `floor`.
/// Returns `None` for prices that can't be moved (zero, negative, NaN).
pub fn jitter_price<R: Rng + ?Sized>(current: f64, band: JitterBand, floor: f64, rng: &mut R) -> Option<f64> {
    if !current.is_finite() || current <= 0.0 {
        return None;
    }

    let pct = if band.max_pct > band.min_pct {
        rng.gen_range(band.min_pct..=band.max_pct)
    } else {
        band.min_pct
    };
    let direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };

    let next = current + current * (pct / 100.0) * direction;
    Some(models::round2(next.max(floor)))
}

pub fn seconds_until_next_update(last: Option<i64>, now: i64, interval: u64) -> u64 {
    let interval = interval.max(1) as i64;
    match last {
        Some(last) if now >= last => (interval - (now - last) % interval) as u64,
        _ => interval as u64,
    }
}

/// `MM:SS`; minutes keep counting past 59.
pub fn format_countdown(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub async fn last_update(state: &AppState) -> Result<Option<i64>, AppError> {
    let settings = state.db.collection::<Document>(models::SETTINGS);
    let found = settings.find_one(doc! { "_id": SETTINGS_ID }, None).await?;
    Ok(found.and_then(|d| d.get_i64("last_updated").ok()))
}

pub async fn countdown(state: &AppState) -> Result<String, AppError> {
    let last = last_update(state).await?;
    let secs = seconds_until_next_update(last, Utc::now().timestamp(), state.settings.price_update_secs);
    Ok(format_countdown(secs))
}

pub fn spawn_price_ticker(state: AppState) {
    tokio::spawn(async move {
        let period = state.settings.price_update_secs;

        // resume the stored schedule instead of restarting it on every boot
        let first = match last_update(&state).await {
            Ok(last) => seconds_until_next_update(last, Utc::now().timestamp(), period),
            Err(e) => {
                tracing::warn!(error = %e, "could not read last price update, using full interval");
                period
            }
        };
        tracing::info!(first_in = first, every = period, "price ticker started");

        let start = time::Instant::now() + Duration::from_secs(first);
        let mut interval = time::interval_at(start, Duration::from_secs(period));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match run_tick(&state).await {
                Ok(changed) => tracing::debug!(changed, "price tick done"),
                Err(e) => tracing::error!(error = %e, "price tick failed"),
            }
        }
    });
}

/// Moves every stock once. Returns how many prices changed.
pub async fn run_tick(state: &AppState) -> Result<usize, AppError> {
    let stocks = state.db.collection::<Stock>(models::STOCKS);
    let mut cursor = stocks.find(doc! {}, None).await?;

    let mut all = vec![];
    while let Some(item) = cursor.next().await {
        all.push(item?);
    }

    let band = JitterBand {
        min_pct: state.settings.price_min_pct,
        max_pct: state.settings.price_max_pct,
    };
    let floor = state.settings.price_floor;
    let now = Utc::now().timestamp();

    // ThreadRng is !Send, so draw every new price before the next await
    let moves: Vec<(Stock, f64)> = {
        let mut rng = rand::thread_rng();
        all.into_iter()
            .filter_map(|s| {
                let next = jitter_price(s.price, band, floor, &mut rng)?;
                (next != models::round2(s.price)).then_some((s, next))
            })
            .collect()
    };

    let mut changed = 0;
    for (s, next) in moves {
        // filtering on the old price leaves a concurrent admin edit alone
        let res = stocks
            .update_one(
                doc! { "_id": s.id, "price": s.price },
                doc! { "$set": { "price": next, "last_updated": now } },
                None,
            )
            .await;

        match res {
            Ok(r) if r.modified_count > 0 => changed += 1,
            Ok(_) => tracing::debug!(symbol = %s.symbol, "price changed under the ticker, skipped"),
            Err(e) => tracing::warn!(error = %e, symbol = %s.symbol, "price update failed"),
        }
    }

    let settings = state.db.collection::<Document>(models::SETTINGS);
    settings
        .update_one(
            doc! { "_id": SETTINGS_ID },
            doc! { "$set": { "last_updated": now } },
            UpdateOptions::builder().upsert(true).build(),
        )
        .await?;

    state.broadcast(&["pricesUpdated", "stocksUpdated"]);
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const BAND: JitterBand = JitterBand { min_pct: 1.0, max_pct: 5.0 };

    #[test]
    fn moves_stay_inside_the_band() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1_000 {
            let next = jitter_price(200.0, BAND, 1.0, &mut rng).unwrap();
            let pct = ((next - 200.0) / 200.0 * 100.0).abs();
            // rounding to cents can nudge the edges by a hair
            assert!(pct >= 0.99 && pct <= 5.01, "move of {pct}% out of band");
        }
    }

    #[test]
    fn both_directions_happen() {
        let mut rng = StdRng::seed_from_u64(7);
        let moves: Vec<f64> = (0..200).map(|_| jitter_price(100.0, BAND, 1.0, &mut rng).unwrap()).collect();
        assert!(moves.iter().any(|p| *p > 100.0));
        assert!(moves.iter().any(|p| *p < 100.0));
    }

    #[test]
    fn floor_holds() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            assert!(jitter_price(1.0, BAND, 1.0, &mut rng).unwrap() >= 1.0);
        }
    }

    #[test]
    fn unmovable_prices_are_skipped() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(jitter_price(0.0, BAND, 1.0, &mut rng), None);
        assert_eq!(jitter_price(-4.0, BAND, 1.0, &mut rng), None);
        assert_eq!(jitter_price(f64::NAN, BAND, 1.0, &mut rng), None);
    }

    #[test]
    fn degenerate_band_uses_min() {
        let mut rng = StdRng::seed_from_u64(9);
        let flat = JitterBand { min_pct: 2.0, max_pct: 2.0 };
        let next = jitter_price(100.0, flat, 1.0, &mut rng).unwrap();
        assert!(next == 102.0 || next == 98.0);
    }

    #[test]
    fn countdown_follows_the_stored_schedule() {
        assert_eq!(seconds_until_next_update(None, 1_000, 600), 600);
        assert_eq!(seconds_until_next_update(Some(1_000), 1_000, 600), 600);
        assert_eq!(seconds_until_next_update(Some(1_000), 1_100, 600), 500);
        // a missed tick rolls into the next slot
        assert_eq!(seconds_until_next_update(Some(1_000), 1_700, 600), 500);
        // clock skew: last update in the future
        assert_eq!(seconds_until_next_update(Some(2_000), 1_000, 600), 600);
    }

    #[test]
    fn countdown_format() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(65), "01:05");
        assert_eq!(format_countdown(600), "10:00");
        assert_eq!(format_countdown(6_000), "100:00");
    }
}
