//! FeedService: tenant-facing feed operations over store, scheduler and delivery.
//!
//! Every write goes to the store first; the scheduler is updated from the
//! stored result so timers always reflect persisted configuration.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use pullfeed_core::{
    ChannelError, ChannelId, ChannelSender, DisplayFormat, FeedConfig, FeedStore, FeedUpdate,
    KeywordKind, KeywordRuleSet, OutgoingMessage, PublisherId, PublisherRegistry, PullFeedError,
    Result, TenantId,
};

use crate::delivery::{DeliveryReport, FeedDelivery};
use crate::scheduler::{FeedScheduler, SyncReport};

pub struct FeedService {
    registry: Arc<PublisherRegistry>,
    store: Arc<dyn FeedStore>,
    sender: Arc<dyn ChannelSender>,
    delivery: Arc<dyn FeedDelivery>,
    scheduler: Arc<FeedScheduler>,
}

impl FeedService {
    pub fn new(
        registry: Arc<PublisherRegistry>,
        store: Arc<dyn FeedStore>,
        sender: Arc<dyn ChannelSender>,
        delivery: Arc<dyn FeedDelivery>,
        scheduler: Arc<FeedScheduler>,
    ) -> Self {
        Self {
            registry,
            store,
            sender,
            delivery,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &FeedScheduler {
        &self.scheduler
    }

    /// Create and arm a feed with the publisher's default weekday.
    pub async fn setup_feed(
        &self,
        tenant: TenantId,
        channel: ChannelId,
        publisher: PublisherId,
        format: Option<DisplayFormat>,
    ) -> Result<FeedConfig> {
        let publisher = self.registry.require(publisher)?;
        let mut feed = FeedConfig::new(tenant, channel, publisher);
        if let Some(format) = format {
            feed.format = format;
        }
        self.store.insert_feed(&feed).await?;
        self.scheduler.reschedule(feed.clone());
        tracing::info!("➕ {} feed set up for tenant {tenant} in channel {channel}", publisher.name);
        Ok(feed)
    }

    /// Edit one publisher's feed, or every feed of the tenant when `publisher`
    /// is `None`. Weekday edits re-arm the timer; other edits reach the armed
    /// task in place.
    pub async fn edit_feeds(
        &self,
        tenant: TenantId,
        publisher: Option<PublisherId>,
        updates: &[FeedUpdate],
    ) -> Result<Vec<FeedConfig>> {
        if updates.is_empty() {
            return Err(PullFeedError::InvalidUpdate("no changes given".into()));
        }

        let targets: Vec<PublisherId> = match publisher {
            Some(p) => vec![p],
            None => self
                .store
                .list_tenant_feeds(tenant)
                .await?
                .into_iter()
                .map(|f| f.publisher)
                .collect(),
        };

        let mut edited = Vec::with_capacity(targets.len());
        for publisher in targets {
            let feed = self.store.update_feed(tenant, publisher, updates).await?;
            if updates.iter().any(FeedUpdate::affects_schedule)
                || !self.scheduler.refresh(feed.clone())
            {
                self.scheduler.reschedule(feed.clone());
            }
            edited.push(feed);
        }
        tracing::info!("✏️ Edited {} feeds for tenant {tenant}", edited.len());
        Ok(edited)
    }

    pub async fn delete_feed(&self, tenant: TenantId, publisher: PublisherId) -> Result<()> {
        if !self.store.delete_feed(tenant, publisher).await? {
            return Err(PullFeedError::ConfigNotFound { tenant, publisher });
        }
        self.scheduler.cancel(&pullfeed_core::FeedKey { tenant, publisher });
        tracing::info!("➖ {publisher} feed removed for tenant {tenant}");
        Ok(())
    }

    /// Deliver now, outside the weekly cadence. The timer is untouched.
    pub async fn trigger_feed(
        &self,
        tenant: TenantId,
        publisher: PublisherId,
    ) -> Result<DeliveryReport> {
        let feed = self
            .store
            .list_tenant_feeds(tenant)
            .await?
            .into_iter()
            .find(|f| f.publisher == publisher)
            .ok_or(PullFeedError::ConfigNotFound { tenant, publisher })?;
        self.delivery.deliver(&feed).await
    }

    pub async fn feeds(&self, tenant: TenantId) -> Result<Vec<FeedConfig>> {
        self.store.list_tenant_feeds(tenant).await
    }

    pub async fn all_feeds(&self) -> Result<Vec<FeedConfig>> {
        self.store.list_feeds().await
    }

    pub async fn keywords(&self, tenant: TenantId) -> Result<KeywordRuleSet> {
        self.store.keyword_rules(tenant).await
    }

    pub async fn add_keyword(&self, tenant: TenantId, kind: KeywordKind, term: &str) -> Result<bool> {
        if KeywordRuleSet::normalize(term).is_empty() {
            return Err(PullFeedError::InvalidUpdate("empty keyword".into()));
        }
        self.store.add_keyword(tenant, kind, term).await
    }

    pub async fn remove_keyword(
        &self,
        tenant: TenantId,
        kind: KeywordKind,
        term: &str,
    ) -> Result<bool> {
        self.store.remove_keyword(tenant, kind, term).await
    }

    /// The tenant removed the bot: cancel its timers and forget its data.
    pub async fn tenant_departed(&self, tenant: TenantId) -> Result<usize> {
        for feed in self.store.list_tenant_feeds(tenant).await? {
            self.scheduler.cancel(&feed.key());
        }
        let removed = self.store.delete_tenant(tenant).await?;
        tracing::info!("🧹 Tenant {tenant} cleaned up ({removed} feeds)");
        Ok(removed)
    }

    /// Send `text` once to every distinct configured channel. Returns how many
    /// channels accepted it.
    pub async fn broadcast(&self, text: &str) -> Result<usize> {
        let channels: BTreeSet<ChannelId> = self
            .store
            .list_feeds()
            .await?
            .into_iter()
            .map(|f| f.channel)
            .collect();

        let mut delivered = 0;
        for channel in channels {
            match self.sender.send_message(channel, OutgoingMessage::text(text)).await {
                Ok(_) => delivered += 1,
                Err(ChannelError::Forbidden(_) | ChannelError::NotFound(_)) => {
                    tracing::debug!("📢 Broadcast skipped channel {channel}");
                }
                Err(e) => tracing::warn!("⚠️ Broadcast to channel {channel} failed: {e}"),
            }
        }
        tracing::info!("📢 Broadcast delivered to {delivered} channels");
        Ok(delivered)
    }

    /// Member counts of the tenants in `feeds`. Unknown sizes are left out.
    pub async fn tenant_sizes(&self, feeds: &[FeedConfig]) -> HashMap<TenantId, u64> {
        let tenants: BTreeSet<TenantId> = feeds.iter().map(|f| f.tenant).collect();
        let lookups = tenants.into_iter().map(|tenant| async move {
            (tenant, self.sender.tenant_size(tenant).await)
        });

        let mut sizes = HashMap::new();
        for (tenant, size) in futures::future::join_all(lookups).await {
            match size {
                Ok(Some(n)) => {
                    sizes.insert(tenant, n);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("Size of tenant {tenant} unavailable: {e}"),
            }
        }
        sizes
    }

    /// Arm every stored feed with freshly spread offsets.
    pub async fn load_schedules(&self) -> Result<usize> {
        let feeds = self.store.list_feeds().await?;
        let sizes = self.tenant_sizes(&feeds).await;
        let count = feeds.len();
        self.scheduler.load_all(feeds, &sizes);
        Ok(count)
    }

    /// Pick up changes made to the store by other processes. Tenant sizes are
    /// only consulted on a full load, so armed cohorts keep their order.
    pub async fn resync(&self) -> Result<SyncReport> {
        let feeds = self.store.list_feeds().await?;
        Ok(self.scheduler.sync(feeds))
    }

    /// Periodic [`resync`](Self::resync). Runs until aborted.
    pub async fn run_resync_loop(self: Arc<Self>, every: Duration) {
        tracing::info!("🔁 Store resync started (every {}s)", every.as_secs());
        let mut interval = tokio::time::interval(every);
        // First tick is immediate; schedules were just loaded.
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = self.resync().await {
                tracing::warn!("⚠️ Store resync failed: {e}");
            }
        }
    }
}
