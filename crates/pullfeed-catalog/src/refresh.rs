//! Background loops fed by the catalog: the daily refresh and the presence
//! status rotation.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use pullfeed_core::Clock;
use pullfeed_core::timing::{next_daily, until};
use rand::Rng;
use tokio::sync::watch;

use crate::catalog::ReleaseCatalog;

/// When the daily refresh runs.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSchedule {
    /// UTC time the new week's data is expected upstream.
    pub cutoff: NaiveTime,
    /// How long before `cutoff` to refresh.
    pub lead: chrono::Duration,
}

impl RefreshSchedule {
    pub fn new(cutoff_hour: u32, lead_minutes: u32) -> Self {
        Self {
            cutoff: NaiveTime::from_hms_opt(cutoff_hour % 24, 0, 0).unwrap_or(NaiveTime::MIN),
            lead: chrono::Duration::minutes(lead_minutes as i64),
        }
    }
}

/// Refresh once immediately, then daily forever.
pub async fn run_refresh_loop(
    catalog: Arc<ReleaseCatalog>,
    clock: Arc<dyn Clock>,
    schedule: RefreshSchedule,
) {
    tracing::info!(
        "⏰ Catalog refresh loop started (daily at {} UTC minus {}m)",
        schedule.cutoff.format("%H:%M"),
        schedule.lead.num_minutes()
    );
    catalog.refresh_all().await;

    loop {
        let now = clock.now();
        let next = next_daily(schedule.cutoff, schedule.lead, now);
        tracing::debug!("next catalog refresh at {next}");
        tokio::time::sleep(until(next, now)).await;
        catalog.refresh_all().await;
    }
}

/// Seconds between status changes.
pub const STATUS_INTERVAL_SECS: RangeInclusive<u64> = 600..=3000;

/// Publish "📖 {title}" with a random catalog title at random intervals.
/// The platform gateway subscribes to the receiver side.
pub async fn run_status_rotation(
    catalog: Arc<ReleaseCatalog>,
    status: watch::Sender<Option<String>>,
    interval: RangeInclusive<u64>,
) {
    loop {
        if let Some(title) = catalog.random_title().await {
            let line = format!("📖 {title}");
            tracing::debug!("status → {line}");
            if status.send(Some(line)).is_err() {
                tracing::debug!("status receiver dropped, stopping rotation");
                return;
            }
        }
        let secs = rand::thread_rng().gen_range(interval.clone());
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}
