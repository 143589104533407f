//! In-memory release snapshots, one per publisher.
//!
//! A refresh builds a complete [`CatalogSnapshot`] off to the side and swaps the
//! `Arc` in under the write lock. Readers clone the `Arc` and never see a partly
//! built snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use pullfeed_core::{Publisher, PublisherId, PublisherRegistry, Release, Result};
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use crate::fetcher::CatalogFetcher;

/// One publisher's releases as of a successful fetch.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub publisher: PublisherId,
    pub releases: HashMap<u64, Release>,
    /// Display order.
    pub order: Vec<u64>,
    /// Latest release date in the snapshot; the "week" a feed announces.
    pub week_of: Option<NaiveDate>,
    pub fetched_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    /// Deduplicates by id (last one wins) and sorts by format precedence, title,
    /// release date, then id.
    pub fn build(publisher: PublisherId, releases: Vec<Release>, fetched_at: DateTime<Utc>) -> Self {
        let mut by_id: HashMap<u64, Release> = HashMap::with_capacity(releases.len());
        for release in releases {
            by_id.insert(release.id, release);
        }

        let mut order: Vec<u64> = by_id.keys().copied().collect();
        order.sort_by(|a, b| {
            let (ra, rb) = (&by_id[a], &by_id[b]);
            ra.format
                .precedence()
                .cmp(&rb.format.precedence())
                .then_with(|| ra.title.cmp(&rb.title))
                .then_with(|| ra.release_date.cmp(&rb.release_date))
                .then_with(|| ra.id.cmp(&rb.id))
        });

        let week_of = by_id.values().map(|r| r.release_date).max();
        Self {
            publisher,
            releases: by_id,
            order,
            week_of,
            fetched_at,
        }
    }

    /// Releases in display order.
    pub fn ordered(&self) -> impl Iterator<Item = &Release> + '_ {
        self.order.iter().filter_map(|id| self.releases.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Outcome of [`ReleaseCatalog::refresh_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// Publisher → release count of the new snapshot.
    pub refreshed: Vec<(PublisherId, usize)>,
    /// Publisher → error text. Their previous snapshot was kept.
    pub failed: Vec<(PublisherId, String)>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Shared catalog. Single writer (the refresh loop), many readers.
pub struct ReleaseCatalog {
    registry: Arc<PublisherRegistry>,
    fetcher: CatalogFetcher,
    snapshots: RwLock<HashMap<PublisherId, Arc<CatalogSnapshot>>>,
}

impl ReleaseCatalog {
    pub fn new(registry: Arc<PublisherRegistry>, fetcher: CatalogFetcher) -> Self {
        Self {
            registry,
            fetcher,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &PublisherRegistry {
        &self.registry
    }

    /// Refresh every registered publisher. A failure only affects that publisher.
    pub async fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        for publisher in self.registry.iter() {
            match self.refresh(publisher).await {
                Ok(count) => report.refreshed.push((publisher.id, count)),
                Err(e) => {
                    tracing::warn!("⚠️ [{}] refresh failed, keeping previous snapshot: {e}", publisher.name);
                    report.failed.push((publisher.id, e.to_string()));
                }
            }
        }
        tracing::info!(
            "🔄 Catalog refreshed: {} ok, {} failed",
            report.refreshed.len(),
            report.failed.len()
        );
        report
    }

    /// Fetch one publisher and swap its snapshot. Returns the new release count.
    pub async fn refresh(&self, publisher: &Publisher) -> Result<usize> {
        let releases = self.fetcher.fetch(publisher).await?;
        let snapshot = CatalogSnapshot::build(publisher.id, releases, Utc::now());
        let count = snapshot.len();
        self.replace_snapshot(snapshot).await;
        Ok(count)
    }

    pub async fn replace_snapshot(&self, snapshot: CatalogSnapshot) {
        let publisher = snapshot.publisher;
        self.snapshots.write().await.insert(publisher, Arc::new(snapshot));
    }

    /// `None` until the publisher's first successful fetch.
    pub async fn snapshot(&self, publisher: PublisherId) -> Option<Arc<CatalogSnapshot>> {
        self.snapshots.read().await.get(&publisher).cloned()
    }

    /// Any title across all snapshots.
    pub async fn random_title(&self) -> Option<String> {
        let snapshots = self.snapshots.read().await;
        let titles: Vec<&str> = snapshots
            .values()
            .flat_map(|s| s.releases.values().map(|r| r.title.as_str()))
            .collect();
        titles.choose(&mut rand::thread_rng()).map(|t| t.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::{FakeSource, detail};
    use pullfeed_core::ReleaseFormat;
    use std::collections::BTreeMap;

    fn release(id: u64, title: &str, format: ReleaseFormat, day: u32) -> Release {
        Release {
            id,
            publisher: PublisherId::Dc,
            title: title.into(),
            description: None,
            creators: BTreeMap::new(),
            format,
            release_date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            price: None,
            page_count: None,
            cover_image_url: None,
            detail_url: None,
        }
    }

    #[test]
    fn test_snapshot_order_is_deterministic() {
        let releases = vec![
            release(5, "Batman Vol. 1", ReleaseFormat::TradePaperback, 14),
            release(4, "Absolute Omnibus", ReleaseFormat::Other("Omnibus".into()), 14),
            release(3, "Superman #1", ReleaseFormat::Issue, 14),
            release(2, "Batman #150", ReleaseFormat::Issue, 15),
            release(1, "Batman #150", ReleaseFormat::Issue, 14),
            release(6, "Absolute Batman HC", ReleaseFormat::Hardcover, 13),
        ];
        let snap = CatalogSnapshot::build(PublisherId::Dc, releases.clone(), Utc::now());
        assert_eq!(snap.order, vec![1, 2, 3, 5, 6, 4]);
        assert_eq!(snap.week_of, NaiveDate::from_ymd_opt(2026, 10, 15));

        let mut reversed = releases;
        reversed.reverse();
        let again = CatalogSnapshot::build(PublisherId::Dc, reversed, Utc::now());
        assert_eq!(snap.order, again.order);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = CatalogSnapshot::build(PublisherId::Dc, vec![], Utc::now());
        assert!(snap.is_empty());
        assert!(snap.week_of.is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let source = Arc::new(FakeSource::with(vec![
            (1, detail(1, "Daredevil #1", "Comic")),
            (2, detail(2, "Hulk #3", "Comic")),
        ]));
        let registry = Arc::new(PublisherRegistry::with_enabled(&[PublisherId::Marvel]));
        let catalog = ReleaseCatalog::new(registry, CatalogFetcher::new(source.clone(), 50));

        assert!(catalog.snapshot(PublisherId::Marvel).await.is_none());
        let report = catalog.refresh_all().await;
        assert_eq!(report.refreshed, vec![(PublisherId::Marvel, 2)]);
        let before = catalog.snapshot(PublisherId::Marvel).await.unwrap();

        *source.listing.lock().unwrap() = Err("upstream down".into());
        let report = catalog.refresh_all().await;
        assert!(!report.is_complete());
        let after = catalog.snapshot(PublisherId::Marvel).await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_random_title() {
        let registry = Arc::new(PublisherRegistry::builtin());
        let catalog = ReleaseCatalog::new(
            registry,
            CatalogFetcher::new(Arc::new(FakeSource::with(vec![])), 50),
        );
        assert!(catalog.random_title().await.is_none());
        catalog
            .replace_snapshot(CatalogSnapshot::build(
                PublisherId::Dc,
                vec![release(1, "Nightwing #120", ReleaseFormat::Issue, 14)],
                Utc::now(),
            ))
            .await;
        assert_eq!(catalog.random_title().await.as_deref(), Some("Nightwing #120"));
        assert!(catalog.snapshot(PublisherId::Dc).await.is_some());
    }
}
