//! In-memory fakes for the collaborator traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use pullfeed_core::types::apply_update;
use pullfeed_core::{
    ChannelAccess, ChannelError, ChannelId, ChannelSender, Clock, FeedConfig, FeedStore,
    FeedUpdate, KeywordKind, KeywordRuleSet, MessageHandle, MessageId, OutgoingMessage,
    Permissions, PinnedMessage, Publisher, PublisherId, PublisherRegistry, PullFeedError,
    RecentMessage, Release, ReleaseFormat, Result, TenantId, UserId,
};

pub const BOT: UserId = UserId(1);

pub fn publisher(id: PublisherId) -> &'static Publisher {
    PublisherRegistry::builtin()
        .get(id)
        .expect("builtin publisher")
}

pub fn release(id: u64, title: &str) -> Release {
    release_with_format(id, title, ReleaseFormat::Issue)
}

pub fn release_with_format(id: u64, title: &str, format: ReleaseFormat) -> Release {
    Release {
        id,
        publisher: PublisherId::Marvel,
        title: title.into(),
        description: None,
        creators: BTreeMap::new(),
        format,
        release_date: NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
        price: None,
        page_count: None,
        cover_image_url: None,
        detail_url: Some(format!("https://leagueofcomicgeeks.com/comic/{id}")),
    }
}

/// Feed in channel `1000 + tenant`, Summary format.
pub fn feed(tenant: u64, publisher_id: PublisherId, weekday: Weekday) -> FeedConfig {
    let mut f = FeedConfig::new(TenantId(tenant), ChannelId(1000 + tenant), publisher(publisher_id));
    f.weekday = weekday;
    f
}

pub fn handle(channel: ChannelId, message: u64) -> MessageHandle {
    MessageHandle {
        channel,
        message: MessageId(message),
    }
}

/// Wall clock that follows tokio's (paused) time.
pub struct PausedClock {
    origin: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl PausedClock {
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.start;
        self.origin + chrono::Duration::from_std(elapsed).unwrap()
    }
}

// ─── ChannelSender ────────────────────────────────────────

#[derive(Default)]
struct SenderState {
    next_id: u64,
    sent: Vec<(ChannelId, OutgoingMessage)>,
    /// Oldest first.
    pins: HashMap<ChannelId, Vec<(u64, UserId)>>,
    latest: HashMap<ChannelId, RecentMessage>,
    deleted: Vec<MessageHandle>,
    access: HashMap<ChannelId, ChannelAccess>,
    sizes: HashMap<TenantId, u64>,
    /// Indices (0-based, over all sends) that fail.
    fail_sends: Vec<usize>,
    send_attempts: usize,
    pin_error: Option<ChannelError>,
}

/// Records everything; channels must be registered with [`FakeSender::open_channel`].
pub struct FakeSender {
    state: Mutex<SenderState>,
}

impl FakeSender {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SenderState {
                next_id: 10_000,
                ..SenderState::default()
            }),
        }
    }

    pub fn open_channel(&self, channel: ChannelId, tenant: TenantId) {
        self.set_access(
            channel,
            ChannelAccess {
                tenant,
                permissions: Permissions(Permissions::ALL),
            },
        );
    }

    pub fn set_access(&self, channel: ChannelId, access: ChannelAccess) {
        self.state.lock().unwrap().access.insert(channel, access);
    }

    pub fn set_tenant_size(&self, tenant: TenantId, size: u64) {
        self.state.lock().unwrap().sizes.insert(tenant, size);
    }

    pub fn fail_send_at(&self, index: usize) {
        self.state.lock().unwrap().fail_sends.push(index);
    }

    pub fn fail_pins(&self, error: ChannelError) {
        self.state.lock().unwrap().pin_error = Some(error);
    }

    pub fn seed_pin(&self, channel: ChannelId, message: u64, author: UserId) {
        self.state
            .lock()
            .unwrap()
            .pins
            .entry(channel)
            .or_default()
            .push((message, author));
    }

    /// Pinned message ids, oldest first.
    pub fn pins(&self, channel: ChannelId) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .pins
            .get(&channel)
            .map(|p| p.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<(ChannelId, OutgoingMessage)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_to(&self, channel: ChannelId) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageHandle> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl ChannelSender for FakeSender {
    async fn current_user(&self) -> std::result::Result<UserId, ChannelError> {
        Ok(BOT)
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> std::result::Result<MessageHandle, ChannelError> {
        let mut s = self.state.lock().unwrap();
        let attempt = s.send_attempts;
        s.send_attempts += 1;
        if s.fail_sends.contains(&attempt) {
            return Err(ChannelError::Http("500 Internal Server Error".into()));
        }
        if !s.access.contains_key(&channel) {
            return Err(ChannelError::NotFound(format!("channel {channel}")));
        }
        s.next_id += 1;
        let h = handle(channel, s.next_id);
        s.sent.push((channel, message));
        s.latest.insert(
            channel,
            RecentMessage {
                handle: h,
                author: BOT,
                is_pin_notice: false,
            },
        );
        Ok(h)
    }

    async fn pin_message(&self, target: MessageHandle) -> std::result::Result<(), ChannelError> {
        let mut s = self.state.lock().unwrap();
        if let Some(e) = &s.pin_error {
            return Err(e.clone());
        }
        s.pins
            .entry(target.channel)
            .or_default()
            .push((target.message.0, BOT));
        s.next_id += 1;
        let notice = handle(target.channel, s.next_id);
        s.latest.insert(
            target.channel,
            RecentMessage {
                handle: notice,
                author: BOT,
                is_pin_notice: true,
            },
        );
        Ok(())
    }

    async fn unpin_message(&self, target: MessageHandle) -> std::result::Result<(), ChannelError> {
        let mut s = self.state.lock().unwrap();
        if let Some(e) = &s.pin_error {
            return Err(e.clone());
        }
        if let Some(pins) = s.pins.get_mut(&target.channel) {
            pins.retain(|(id, _)| *id != target.message.0);
        }
        Ok(())
    }

    async fn list_pins(
        &self,
        channel: ChannelId,
    ) -> std::result::Result<Vec<PinnedMessage>, ChannelError> {
        let s = self.state.lock().unwrap();
        if let Some(e) = &s.pin_error {
            return Err(e.clone());
        }
        Ok(s.pins
            .get(&channel)
            .map(|pins| {
                pins.iter()
                    .rev()
                    .map(|(id, author)| PinnedMessage {
                        handle: handle(channel, *id),
                        author: *author,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_message(
        &self,
        channel: ChannelId,
    ) -> std::result::Result<Option<RecentMessage>, ChannelError> {
        Ok(self.state.lock().unwrap().latest.get(&channel).copied())
    }

    async fn delete_message(&self, target: MessageHandle) -> std::result::Result<(), ChannelError> {
        let mut s = self.state.lock().unwrap();
        s.deleted.push(target);
        if s.latest.get(&target.channel).map(|m| m.handle) == Some(target) {
            s.latest.remove(&target.channel);
        }
        Ok(())
    }

    async fn channel_access(
        &self,
        channel: ChannelId,
    ) -> std::result::Result<ChannelAccess, ChannelError> {
        self.state
            .lock()
            .unwrap()
            .access
            .get(&channel)
            .copied()
            .ok_or_else(|| ChannelError::NotFound(format!("channel {channel}")))
    }

    async fn tenant_size(&self, tenant: TenantId) -> std::result::Result<Option<u64>, ChannelError> {
        Ok(self.state.lock().unwrap().sizes.get(&tenant).copied())
    }
}

// ─── FeedStore ────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    feeds: Mutex<Vec<FeedConfig>>,
    keywords: Mutex<HashMap<TenantId, KeywordRuleSet>>,
}

impl MemoryStore {
    pub fn with_feeds(feeds: Vec<FeedConfig>) -> Self {
        Self {
            feeds: Mutex::new(feeds),
            keywords: Mutex::default(),
        }
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn list_feeds(&self) -> Result<Vec<FeedConfig>> {
        Ok(self.feeds.lock().unwrap().clone())
    }

    async fn list_tenant_feeds(&self, tenant: TenantId) -> Result<Vec<FeedConfig>> {
        Ok(self
            .feeds
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.tenant == tenant)
            .cloned()
            .collect())
    }

    async fn insert_feed(&self, feed: &FeedConfig) -> Result<()> {
        let mut feeds = self.feeds.lock().unwrap();
        if feeds.iter().any(|f| f.key() == feed.key()) {
            return Err(PullFeedError::FeedExists {
                tenant: feed.tenant,
                publisher: feed.publisher,
            });
        }
        feeds.push(feed.clone());
        Ok(())
    }

    async fn update_feed(
        &self,
        tenant: TenantId,
        publisher: PublisherId,
        updates: &[FeedUpdate],
    ) -> Result<FeedConfig> {
        let mut feeds = self.feeds.lock().unwrap();
        let feed = feeds
            .iter_mut()
            .find(|f| f.tenant == tenant && f.publisher == publisher)
            .ok_or(PullFeedError::ConfigNotFound { tenant, publisher })?;
        apply_update(feed, updates);
        Ok(feed.clone())
    }

    async fn delete_feed(&self, tenant: TenantId, publisher: PublisherId) -> Result<bool> {
        let mut feeds = self.feeds.lock().unwrap();
        let before = feeds.len();
        feeds.retain(|f| !(f.tenant == tenant && f.publisher == publisher));
        Ok(feeds.len() < before)
    }

    async fn keyword_rules(&self, tenant: TenantId) -> Result<KeywordRuleSet> {
        Ok(self
            .keywords
            .lock()
            .unwrap()
            .get(&tenant)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_keyword(&self, tenant: TenantId, kind: KeywordKind, term: &str) -> Result<bool> {
        Ok(self
            .keywords
            .lock()
            .unwrap()
            .entry(tenant)
            .or_default()
            .add(kind, term))
    }

    async fn remove_keyword(&self, tenant: TenantId, kind: KeywordKind, term: &str) -> Result<bool> {
        Ok(self
            .keywords
            .lock()
            .unwrap()
            .entry(tenant)
            .or_default()
            .remove(kind, term))
    }

    async fn delete_tenant(&self, tenant: TenantId) -> Result<usize> {
        self.keywords.lock().unwrap().remove(&tenant);
        let mut feeds = self.feeds.lock().unwrap();
        let before = feeds.len();
        feeds.retain(|f| f.tenant != tenant);
        Ok(before - feeds.len())
    }
}
