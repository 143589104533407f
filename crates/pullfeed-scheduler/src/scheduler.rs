//! FeedScheduler: one long-lived timer task per (tenant, publisher) feed.
//!
//! Each task loops: sleep until the feed's weekday at the trigger time plus its
//! offset, deliver, compute the following week, repeat. The task map is the
//! single source of truth for "armed"; at most one task per key lives in it.
//! A feed keeps its offset for as long as its weekday is unchanged, so edits
//! and store syncs never reorder a cohort that is already armed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use pullfeed_core::timing::{next_weekly, until};
use pullfeed_core::{Clock, FeedConfig, FeedKey, PullFeedError, Result, TenantId};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::delivery::FeedDelivery;
use crate::offsets::{Spacing, spread_offsets};

struct FeedTask {
    handle: JoinHandle<()>,
    next_fire: watch::Receiver<DateTime<Utc>>,
    /// Read by the task at each fire.
    config: watch::Sender<FeedConfig>,
    offset: Duration,
}

impl FeedTask {
    fn weekday(&self) -> Weekday {
        self.config.borrow().weekday
    }
}

/// Changes made by [`FeedScheduler::sync`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub rescheduled: usize,
    /// Config changed without moving the timer.
    pub updated: usize,
    pub removed: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.rescheduled == 0 && self.updated == 0 && self.removed == 0
    }
}

pub struct FeedScheduler {
    delivery: Arc<dyn FeedDelivery>,
    clock: Arc<dyn Clock>,
    trigger_at: NaiveTime,
    spacing: Spacing,
    tasks: Mutex<HashMap<FeedKey, FeedTask>>,
}

impl FeedScheduler {
    pub fn new(
        delivery: Arc<dyn FeedDelivery>,
        clock: Arc<dyn Clock>,
        trigger_at: NaiveTime,
        spacing: Spacing,
    ) -> Self {
        Self {
            delivery,
            clock,
            trigger_at,
            spacing,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<FeedKey, FeedTask>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Offset after the cohort's trigger time of an armed feed.
    pub fn offset(&self, key: &FeedKey) -> Option<Duration> {
        self.tasks().get(key).map(|t| t.offset)
    }

    /// Arm a feed. `AlreadyScheduled` if the key already has a live task.
    pub fn schedule(&self, feed: FeedConfig) -> Result<()> {
        let mut tasks = self.tasks();
        if let Some(existing) = tasks.get(&feed.key())
            && !existing.handle.is_finished()
        {
            return Err(PullFeedError::AlreadyScheduled(feed.key()));
        }
        let offset = self.slot(&tasks, &feed);
        self.arm(&mut tasks, feed, offset);
        Ok(())
    }

    /// Abort the feed's task. Returns whether one existed.
    pub fn cancel(&self, key: &FeedKey) -> bool {
        match self.tasks().remove(key) {
            Some(task) => {
                task.handle.abort();
                tracing::info!("🛑 {key} timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel then schedule, under one lock.
    pub fn reschedule(&self, feed: FeedConfig) {
        let mut tasks = self.tasks();
        let offset = self.slot(&tasks, &feed);
        if let Some(old) = tasks.remove(&feed.key()) {
            old.handle.abort();
        }
        self.arm(&mut tasks, feed, offset);
    }

    /// Hand an edited config to the live task without touching its timer.
    /// Returns false, changing nothing, when the feed is not armed or its
    /// weekday differs; the caller must reschedule instead.
    pub fn refresh(&self, feed: FeedConfig) -> bool {
        let tasks = self.tasks();
        match tasks.get(&feed.key()) {
            Some(task) if !task.handle.is_finished() && task.weekday() == feed.weekday => {
                task.config.send_replace(feed);
                true
            }
            _ => false,
        }
    }

    /// Recompute offsets over the full set and re-arm every feed. Tasks for
    /// keys not in `feeds` are cancelled.
    pub fn load_all(&self, feeds: Vec<FeedConfig>, tenant_sizes: &HashMap<TenantId, u64>) {
        let offsets = spread_offsets(&feeds, tenant_sizes, self.spacing);
        let mut tasks = self.tasks();
        for (_, task) in tasks.drain() {
            task.handle.abort();
        }
        let count = feeds.len();
        for feed in feeds {
            let offset = offsets.get(&feed.key()).copied().unwrap_or_default();
            self.arm(&mut tasks, feed, offset);
        }
        tracing::info!("⏰ Scheduled {count} feeds");
    }

    /// Reconcile with a fresh store listing: cancel removed feeds, re-arm those
    /// whose weekday moved, refresh other edits in place, arm new ones in the
    /// next free slot of their cohort. Unchanged feeds are left alone.
    pub fn sync(&self, feeds: Vec<FeedConfig>) -> SyncReport {
        let mut report = SyncReport::default();
        let mut tasks = self.tasks();

        let wanted: HashSet<FeedKey> = feeds.iter().map(FeedConfig::key).collect();
        let stale: Vec<FeedKey> = tasks.keys().filter(|k| !wanted.contains(k)).copied().collect();
        for key in stale {
            if let Some(task) = tasks.remove(&key) {
                task.handle.abort();
                report.removed += 1;
            }
        }

        for feed in feeds {
            let key = feed.key();
            match tasks.get(&key) {
                Some(task) if !task.handle.is_finished() && task.weekday() == feed.weekday => {
                    if *task.config.borrow() != feed {
                        task.config.send_replace(feed);
                        report.updated += 1;
                    }
                }
                Some(_) => {
                    let offset = self.slot(&tasks, &feed);
                    if let Some(old) = tasks.remove(&key) {
                        old.handle.abort();
                    }
                    self.arm(&mut tasks, feed, offset);
                    report.rescheduled += 1;
                }
                None => {
                    let offset = self.slot(&tasks, &feed);
                    self.arm(&mut tasks, feed, offset);
                    report.added += 1;
                }
            }
        }

        if !report.is_noop() {
            tracing::info!(
                "🔁 Feed sync: +{} ~{} *{} -{}",
                report.added,
                report.rescheduled,
                report.updated,
                report.removed
            );
        }
        report
    }

    /// Next trigger instant of an armed feed.
    pub fn next_fire(&self, key: &FeedKey) -> Option<DateTime<Utc>> {
        self.tasks().get(key).map(|t| *t.next_fire.borrow())
    }

    pub fn is_scheduled(&self, key: &FeedKey) -> bool {
        self.tasks().contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.tasks().len()
    }

    /// Abort every task. In-flight deliveries are abandoned.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks();
        let count = tasks.len();
        for (_, task) in tasks.drain() {
            task.handle.abort();
        }
        tracing::info!("🛑 Scheduler stopped ({count} timers aborted)");
    }

    /// The feed's own offset while its weekday is unchanged, otherwise the
    /// slot right after the last feed of the target cohort.
    fn slot(&self, tasks: &HashMap<FeedKey, FeedTask>, feed: &FeedConfig) -> Duration {
        let key = feed.key();
        if let Some(task) = tasks.get(&key)
            && task.weekday() == feed.weekday
        {
            return task.offset;
        }
        tasks
            .iter()
            .filter(|(k, t)| **k != key && t.weekday() == feed.weekday)
            .map(|(_, t)| t.offset + self.spacing.after(t.config.borrow().format))
            .max()
            .unwrap_or_default()
    }

    fn arm(&self, tasks: &mut HashMap<FeedKey, FeedTask>, feed: FeedConfig, offset: Duration) {
        let key = feed.key();
        let first = fire_after(
            feed.weekday,
            self.trigger_at,
            chrono_offset(offset),
            self.clock.now(),
        );
        let (fire_tx, fire_rx) = watch::channel(first);
        let (config_tx, config_rx) = watch::channel(feed);

        tracing::debug!("⏰ {key} armed for {first} (offset {offset:?})");
        let handle = tokio::spawn(run_feed(
            self.delivery.clone(),
            self.clock.clone(),
            config_rx,
            self.trigger_at,
            offset,
            fire_tx,
        ));
        tasks.insert(
            key,
            FeedTask {
                handle,
                next_fire: fire_rx,
                config: config_tx,
                offset,
            },
        );
    }
}

impl Drop for FeedScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks().drain() {
            task.handle.abort();
        }
    }
}

fn chrono_offset(offset: Duration) -> chrono::Duration {
    chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero())
}

/// First `weekday` at `trigger_at + offset` strictly after `now`. The offset is
/// taken off before the weekly step so an instant inside the cohort's window
/// still lands on this week.
fn fire_after(
    weekday: Weekday,
    trigger_at: NaiveTime,
    offset: chrono::Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    next_weekly(weekday, trigger_at, now - offset) + offset
}

/// The per-feed loop. Never returns on its own; ends by abort.
async fn run_feed(
    delivery: Arc<dyn FeedDelivery>,
    clock: Arc<dyn Clock>,
    config: watch::Receiver<FeedConfig>,
    trigger_at: NaiveTime,
    offset: Duration,
    next_fire: watch::Sender<DateTime<Utc>>,
) {
    let (key, weekday) = {
        let feed = config.borrow();
        (feed.key(), feed.weekday)
    };
    let offset = chrono_offset(offset);
    let mut fire_at = *next_fire.borrow();

    loop {
        tokio::time::sleep(until(fire_at, clock.now())).await;

        tracing::info!("🔔 {key} firing");
        let feed = config.borrow().clone();
        if let Err(e) = delivery.deliver(&feed).await {
            tracing::warn!("⚠️ {key} occurrence skipped: {e}");
        }

        // Following week, strictly after the instant that just fired.
        fire_at = fire_after(weekday, trigger_at, offset, fire_at.max(clock.now()));
        next_fire.send_replace(fire_at);
        tracing::debug!("⏰ {key} next at {fire_at}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryReport;
    use crate::testing::{PausedClock, feed};
    use async_trait::async_trait;
    use chrono::{TimeZone, Weekday};
    use pullfeed_core::{DisplayFormat, PublisherId};

    /// Records (config, clock time) per delivery.
    struct Recorder {
        clock: Arc<PausedClock>,
        calls: Mutex<Vec<(FeedConfig, DateTime<Utc>)>>,
        fail: bool,
    }

    #[async_trait]
    impl FeedDelivery for Recorder {
        async fn deliver(&self, feed: &FeedConfig) -> Result<DeliveryReport> {
            self.calls.lock().unwrap().push((feed.clone(), self.clock.now()));
            if self.fail {
                return Err(PullFeedError::CatalogNotReady(feed.publisher));
            }
            Ok(DeliveryReport::default())
        }
    }

    fn origin() -> DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn at_0130() -> NaiveTime {
        NaiveTime::from_hms_opt(1, 30, 0).unwrap()
    }

    fn setup(fail: bool) -> (FeedScheduler, Arc<Recorder>) {
        let clock = Arc::new(PausedClock::starting_at(origin()));
        let recorder = Arc::new(Recorder {
            clock: clock.clone(),
            calls: Mutex::new(Vec::new()),
            fail,
        });
        let scheduler = FeedScheduler::new(recorder.clone(), clock, at_0130(), Spacing::default());
        (scheduler, recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_weekly_forever() {
        let (scheduler, recorder) = setup(false);
        scheduler.schedule(feed(1, PublisherId::Marvel, Weekday::Wed)).unwrap();

        tokio::time::sleep(Duration::from_secs(17 * 24 * 3600)).await;
        let calls = recorder.calls.lock().unwrap().clone();
        let times: Vec<DateTime<Utc>> = calls.iter().map(|(_, t)| *t).collect();
        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2026, 10, 21, 1, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 10, 28, 1, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 11, 4, 1, 30, 0).unwrap(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_keeps_feed_armed() {
        let (scheduler, recorder) = setup(true);
        let f = feed(1, PublisherId::Marvel, Weekday::Tue);
        scheduler.schedule(f.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(8 * 24 * 3600)).await;
        assert_eq!(recorder.calls.lock().unwrap().len(), 2);
        assert!(scheduler.is_scheduled(&f.key()));
        assert_eq!(
            scheduler.next_fire(&f.key()),
            Some(Utc.with_ymd_and_hms(2026, 11, 3, 1, 30, 0).unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_timer_per_key() {
        let (scheduler, recorder) = setup(false);
        let f = feed(1, PublisherId::Marvel, Weekday::Wed);

        scheduler.schedule(f.clone()).unwrap();
        assert!(matches!(
            scheduler.schedule(f.clone()),
            Err(PullFeedError::AlreadyScheduled(_))
        ));
        for _ in 0..5 {
            scheduler.reschedule(f.clone());
            assert_eq!(scheduler.active_count(), 1);
        }
        assert!(scheduler.cancel(&f.key()));
        assert!(!scheduler.cancel(&f.key()));
        assert_eq!(scheduler.active_count(), 0);
        scheduler.schedule(f.clone()).unwrap();
        scheduler.reschedule(f.clone());
        assert_eq!(scheduler.active_count(), 1);

        // Aborted tasks never fire: exactly one delivery on Wednesday.
        tokio::time::sleep(Duration::from_secs(2 * 24 * 3600)).await;
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_weekday_edit_moves_timer() {
        let (scheduler, _recorder) = setup(false);
        let mut f = feed(1, PublisherId::Marvel, Weekday::Wed);
        scheduler.schedule(f.clone()).unwrap();
        assert_eq!(
            scheduler.next_fire(&f.key()),
            Some(Utc.with_ymd_and_hms(2026, 10, 21, 1, 30, 0).unwrap())
        );

        f.weekday = Weekday::Fri;
        scheduler.reschedule(f.clone());
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(
            scheduler.next_fire(&f.key()),
            Some(next_weekly(Weekday::Fri, at_0130(), origin()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_all_spreads_offsets() {
        let (scheduler, recorder) = setup(false);
        let mut full = feed(2, PublisherId::Marvel, Weekday::Wed);
        full.format = DisplayFormat::Full;
        let feeds = vec![feed(1, PublisherId::Marvel, Weekday::Wed), full.clone(), feed(3, PublisherId::Dc, Weekday::Wed)];
        scheduler.load_all(feeds, &HashMap::new());
        assert_eq!(scheduler.active_count(), 3);
        assert_eq!(scheduler.offset(&full.key()), Some(Duration::from_secs(1)));

        tokio::time::sleep(Duration::from_secs(2 * 24 * 3600)).await;
        let calls = recorder.calls.lock().unwrap().clone();
        let base = Utc.with_ymd_and_hms(2026, 10, 21, 1, 30, 0).unwrap();
        let offsets: Vec<i64> = calls.iter().map(|(_, t)| (*t - base).num_milliseconds()).collect();
        assert_eq!(offsets, vec![0, 500, 1000]);
        assert_eq!(calls[2].0.key(), full.key());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_reconciles() {
        let (scheduler, _recorder) = setup(false);
        let a = feed(1, PublisherId::Marvel, Weekday::Wed);
        let b = feed(2, PublisherId::Marvel, Weekday::Thu);
        scheduler.load_all(vec![a.clone(), b.clone()], &HashMap::new());

        let report = scheduler.sync(vec![a.clone(), b.clone()]);
        assert!(report.is_noop());

        let mut b2 = b.clone();
        b2.weekday = Weekday::Sat;
        let c = feed(3, PublisherId::Dc, Weekday::Mon);
        let report = scheduler.sync(vec![b2.clone(), c.clone()]);
        assert_eq!(
            report,
            SyncReport {
                added: 1,
                rescheduled: 1,
                updated: 0,
                removed: 1
            }
        );
        assert!(!scheduler.is_scheduled(&a.key()));
        assert_eq!(
            scheduler.next_fire(&b2.key()),
            Some(Utc.with_ymd_and_hms(2026, 10, 24, 1, 30, 0).unwrap())
        );
        assert_eq!(scheduler.active_count(), 2);
    }

    /// Two Full feeds on Tuesday: `a` at 01:30:00, `b` at 01:30:15.
    fn tuesday_pair(scheduler: &FeedScheduler) -> (FeedConfig, FeedConfig) {
        let mut a = feed(1, PublisherId::Marvel, Weekday::Tue);
        a.format = DisplayFormat::Full;
        let mut b = feed(2, PublisherId::Marvel, Weekday::Tue);
        b.format = DisplayFormat::Full;
        scheduler.load_all(vec![a.clone(), b.clone()], &HashMap::new());
        assert_eq!(scheduler.offset(&b.key()), Some(Duration::from_secs(15)));
        (a, b)
    }

    fn tuesday(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 20, h, m, s).unwrap()
    }

    /// Paused time from the Monday origin to Tue 01:30:05.
    fn into_tuesday_window() -> Duration {
        Duration::from_secs(13 * 3600 + 30 * 60 + 5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_inside_cohort_window_keeps_this_week() {
        let (scheduler, recorder) = setup(false);
        let (a, mut b) = tuesday_pair(&scheduler);

        tokio::time::sleep(into_tuesday_window()).await;
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);

        b.pin = true;
        scheduler.reschedule(b.clone());
        assert_eq!(scheduler.next_fire(&b.key()), Some(tuesday(1, 30, 15)));

        // `a` already fired this week; re-arming it waits for next Tuesday.
        scheduler.reschedule(a.clone());
        assert_eq!(
            scheduler.next_fire(&a.key()),
            Some(Utc.with_ymd_and_hms(2026, 10, 27, 1, 30, 0).unwrap())
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0.key(), b.key());
        assert_eq!(calls[1].1, tuesday(1, 30, 15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_inside_cohort_window_delivers_remaining_feeds() {
        let (scheduler, recorder) = setup(false);
        let (a, b) = tuesday_pair(&scheduler);

        tokio::time::sleep(into_tuesday_window()).await;
        scheduler.load_all(vec![a.clone(), b.clone()], &HashMap::new());
        assert_eq!(scheduler.next_fire(&b.key()), Some(tuesday(1, 30, 15)));

        tokio::time::sleep(Duration::from_secs(60)).await;
        let keys: Vec<FeedKey> = recorder.calls.lock().unwrap().iter().map(|(f, _)| f.key()).collect();
        assert_eq!(keys, vec![a.key(), b.key()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_leaves_unchanged_feeds_on_time() {
        let (scheduler, recorder) = setup(false);
        let (a, mut b) = tuesday_pair(&scheduler);

        tokio::time::sleep(into_tuesday_window()).await;
        b.pin = true;
        let report = scheduler.sync(vec![a.clone(), b.clone()]);
        assert_eq!(
            report,
            SyncReport {
                updated: 1,
                ..SyncReport::default()
            }
        );
        assert_eq!(scheduler.offset(&a.key()), Some(Duration::ZERO));
        assert_eq!(scheduler.offset(&b.key()), Some(Duration::from_secs(15)));
        assert_eq!(scheduler.next_fire(&b.key()), Some(tuesday(1, 30, 15)));

        tokio::time::sleep(Duration::from_secs(60)).await;
        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].0.pin);
        assert_eq!(calls[1].1, tuesday(1, 30, 15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_updates_live_config_only() {
        let (scheduler, recorder) = setup(false);
        let mut f = feed(1, PublisherId::Marvel, Weekday::Wed);
        scheduler.schedule(f.clone()).unwrap();
        let armed_for = scheduler.next_fire(&f.key());

        f.check_keywords = true;
        assert!(scheduler.refresh(f.clone()));
        assert_eq!(scheduler.next_fire(&f.key()), armed_for);

        let mut moved = f.clone();
        moved.weekday = Weekday::Thu;
        assert!(!scheduler.refresh(moved));
        assert!(!scheduler.refresh(feed(2, PublisherId::Marvel, Weekday::Wed)));

        tokio::time::sleep(Duration::from_secs(2 * 24 * 3600)).await;
        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.check_keywords);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_feed_takes_next_free_slot() {
        let (scheduler, _recorder) = setup(false);
        let (_, b) = tuesday_pair(&scheduler);

        let c = feed(3, PublisherId::Marvel, Weekday::Tue);
        scheduler.schedule(c.clone()).unwrap();
        // after b (15 s) plus b's Full spacing
        assert_eq!(scheduler.offset(&c.key()), Some(Duration::from_secs(30)));

        let d = feed(4, PublisherId::Marvel, Weekday::Tue);
        let e = feed(5, PublisherId::Dc, Weekday::Fri);
        let mut all = vec![b.clone(), c.clone(), d.clone(), e.clone()];
        all.push(feed(1, PublisherId::Marvel, Weekday::Tue));
        all[4].format = DisplayFormat::Full;
        let report = scheduler.sync(all);
        assert_eq!(report.added, 2);
        assert_eq!(scheduler.offset(&d.key()), Some(Duration::from_millis(30_500)));
        assert_eq!(scheduler.offset(&e.key()), Some(Duration::ZERO));

        // Moving to another weekday joins the end of that cohort.
        let mut moved = c.clone();
        moved.weekday = Weekday::Fri;
        scheduler.reschedule(moved.clone());
        assert_eq!(scheduler.offset(&moved.key()), Some(Duration::from_millis(500)));
    }
}
