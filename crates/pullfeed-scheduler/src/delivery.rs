//! DeliveryEngine: one feed occurrence, start to finish.
//!
//! ```text
//! lock channel → validate → snapshot (+ keyword filter)
//!   ├── empty      → notice
//!   └── non-empty  → [lead, mention, details] (Full/Compact)
//!                    → [mention] (Summary) → summary sends → pin
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pullfeed_catalog::ReleaseCatalog;
use pullfeed_core::{
    ChannelSender, DisplayFormat, FeedConfig, FeedStore, MessageHandle, OutgoingMessage,
    PublisherRegistry, PullFeedError, Release, Result, UserId,
};
use tokio::sync::OnceCell;

use crate::filter;
use crate::locks::ChannelLocks;
use crate::pins::{PinOutcome, pin_with_rotation};
use crate::render::{self, SummaryEntry};

/// What one occurrence produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Releases left after keyword filtering.
    pub releases: usize,
    /// Messages the platform accepted.
    pub sent: usize,
    /// Detail or summary sends that failed and were skipped.
    pub failed_sends: usize,
    pub lead: Option<MessageHandle>,
    /// First summary send.
    pub summary: Option<MessageHandle>,
    /// `None` when pinning is off or nothing was sent to pin.
    pub pin: Option<PinOutcome>,
}

/// Runs one occurrence of a feed. The scheduler only knows this trait.
#[async_trait]
pub trait FeedDelivery: Send + Sync {
    async fn deliver(&self, feed: &FeedConfig) -> Result<DeliveryReport>;
}

pub struct DeliveryEngine {
    registry: Arc<PublisherRegistry>,
    catalog: Arc<ReleaseCatalog>,
    sender: Arc<dyn ChannelSender>,
    store: Arc<dyn FeedStore>,
    locks: Arc<ChannelLocks>,
    bot: OnceCell<UserId>,
}

impl DeliveryEngine {
    pub fn new(
        registry: Arc<PublisherRegistry>,
        catalog: Arc<ReleaseCatalog>,
        sender: Arc<dyn ChannelSender>,
        store: Arc<dyn FeedStore>,
        locks: Arc<ChannelLocks>,
    ) -> Self {
        Self {
            registry,
            catalog,
            sender,
            store,
            locks,
            bot: OnceCell::new(),
        }
    }

    /// Guild/channel still there, owned by the feed's tenant, and we can post embeds.
    async fn validate(&self, feed: &FeedConfig) -> Result<()> {
        let unavailable = |reason: String| PullFeedError::ChannelUnavailable {
            channel: feed.channel,
            reason,
        };
        let access = self
            .sender
            .channel_access(feed.channel)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if access.tenant != feed.tenant {
            return Err(unavailable(format!(
                "channel belongs to tenant {}, not {}",
                access.tenant, feed.tenant
            )));
        }
        if !access.permissions.can_deliver() {
            return Err(unavailable("missing Send Messages or Embed Links".into()));
        }
        Ok(())
    }

    async fn send(
        &self,
        feed: &FeedConfig,
        message: OutgoingMessage,
        report: &mut DeliveryReport,
    ) -> Option<MessageHandle> {
        match self.sender.send_message(feed.channel, message).await {
            Ok(handle) => {
                report.sent += 1;
                Some(handle)
            }
            Err(e) => {
                tracing::warn!("⚠️ [{}] send to channel {} failed: {e}", feed.key(), feed.channel);
                report.failed_sends += 1;
                None
            }
        }
    }

    async fn pin(&self, target: MessageHandle) -> PinOutcome {
        let bot = self
            .bot
            .get_or_try_init(|| self.sender.current_user())
            .await;
        match bot {
            Ok(bot) => pin_with_rotation(self.sender.as_ref(), *bot, target).await,
            Err(e) => PinOutcome::Failed(e),
        }
    }

    async fn run(&self, feed: &FeedConfig) -> Result<DeliveryReport> {
        self.validate(feed).await?;

        let publisher = self.registry.require(feed.publisher)?;
        let snapshot = self
            .catalog
            .snapshot(feed.publisher)
            .await
            .ok_or(PullFeedError::CatalogNotReady(feed.publisher))?;

        let releases: Vec<&Release> = if feed.check_keywords {
            let rules = self.store.keyword_rules(feed.tenant).await?;
            filter::apply(snapshot.ordered(), &rules)
        } else {
            snapshot.ordered().collect()
        };

        let mut report = DeliveryReport {
            releases: releases.len(),
            ..DeliveryReport::default()
        };

        if releases.is_empty() {
            let notice = OutgoingMessage::text(render::empty_notice(publisher));
            self.sender
                .send_message(feed.channel, notice)
                .await
                .map_err(PullFeedError::Send)?;
            report.sent = 1;
            return Ok(report);
        }

        let date = snapshot
            .week_of
            .unwrap_or_else(|| snapshot.fetched_at.date_naive());
        let mention = feed.mention_role.map(render::mention);
        let mut links: HashMap<u64, String> = HashMap::new();

        if feed.format.sends_details() {
            let lead = self
                .sender
                .send_message(
                    feed.channel,
                    OutgoingMessage::text(render::lead_header(publisher, date)),
                )
                .await
                .map_err(PullFeedError::Send)?;
            report.sent += 1;
            report.lead = Some(lead);

            if let Some(text) = &mention {
                self.send(feed, OutgoingMessage::text(text.clone()), &mut report).await;
            }

            for release in &releases {
                let embed = render::detail_embed(release, publisher, feed.format);
                if let Some(h) = self.send(feed, OutgoingMessage::embeds(vec![embed]), &mut report).await {
                    links.insert(release.id, h.jump_url(feed.tenant));
                }
            }
        } else if let Some(text) = &mention {
            self.send(feed, OutgoingMessage::text(text.clone()), &mut report).await;
        }

        let entries: Vec<SummaryEntry<'_>> = releases
            .iter()
            .map(|r| {
                let link = links.remove(&r.id).or_else(|| r.detail_url.clone());
                SummaryEntry::new(r, link)
            })
            .collect();
        let jump = report.lead.map(|h| h.jump_url(feed.tenant));
        let pages = render::summary_pages(&entries, publisher, date, jump.as_deref());

        for message in render::pack(pages) {
            let handle = self.send(feed, message, &mut report).await;
            if report.summary.is_none() {
                report.summary = handle;
            }
        }

        if feed.pin {
            let target = match feed.format {
                DisplayFormat::Full | DisplayFormat::Compact => report.lead,
                DisplayFormat::Summary => report.summary,
            };
            if let Some(target) = target {
                report.pin = Some(self.pin(target).await);
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl FeedDelivery for DeliveryEngine {
    async fn deliver(&self, feed: &FeedConfig) -> Result<DeliveryReport> {
        let _guard = self.locks.acquire(feed.channel).await;
        let result = self.run(feed).await;
        match &result {
            Ok(report) => tracing::info!(
                "📬 [{}] delivered {} releases in {} messages ({} failed)",
                feed.key(),
                report.releases,
                report.sent,
                report.failed_sends
            ),
            Err(e) => tracing::warn!("⚠️ [{}] delivery skipped: {e}", feed.key()),
        }
        result
    }
}
