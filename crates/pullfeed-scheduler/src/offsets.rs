//! Trigger offsets that spread a weekday cohort's sends over time.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use pullfeed_core::{DisplayFormat, FeedConfig, FeedKey, TenantId};

/// Gap inserted after a feed, by its display format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spacing {
    /// After a Compact or Summary feed.
    pub light: Duration,
    /// After a Full feed.
    pub full: Duration,
}

impl Spacing {
    pub fn from_millis(light_ms: u64, full_ms: u64) -> Self {
        Self {
            light: Duration::from_millis(light_ms),
            full: Duration::from_millis(full_ms),
        }
    }

    pub fn after(&self, format: DisplayFormat) -> Duration {
        match format {
            DisplayFormat::Full => self.full,
            DisplayFormat::Compact | DisplayFormat::Summary => self.light,
        }
    }
}

impl Default for Spacing {
    fn default() -> Self {
        Self::from_millis(500, 15_000)
    }
}

/// Offsets keyed by feed.
pub type ScheduleOffsets = HashMap<FeedKey, Duration>;

/// Within each weekday: order by format priority (Compact, Summary, Full), then
/// tenant size descending with unknown sizes last, then key. The first feed gets
/// zero and each later feed adds the spacing of the one before it.
pub fn spread_offsets(
    feeds: &[FeedConfig],
    tenant_sizes: &HashMap<TenantId, u64>,
    spacing: Spacing,
) -> ScheduleOffsets {
    let mut cohorts: BTreeMap<u32, Vec<&FeedConfig>> = BTreeMap::new();
    for feed in feeds {
        cohorts
            .entry(feed.weekday.num_days_from_monday())
            .or_default()
            .push(feed);
    }

    let mut offsets = ScheduleOffsets::with_capacity(feeds.len());
    for cohort in cohorts.values_mut() {
        cohort.sort_by(|a, b| {
            let size_a = tenant_sizes.get(&a.tenant);
            let size_b = tenant_sizes.get(&b.tenant);
            a.format
                .priority()
                .cmp(&b.format.priority())
                // Some(larger) first, None last.
                .then_with(|| match (size_a, size_b) {
                    (Some(x), Some(y)) => y.cmp(x),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.key().cmp(&b.key()))
        });

        let mut at = Duration::ZERO;
        for feed in cohort.iter() {
            offsets.insert(feed.key(), at);
            at += spacing.after(feed.format);
        }
    }
    offsets
}
