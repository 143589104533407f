//! Collaborator traits. The scheduler only ever talks to these.

use async_trait::async_trait;

use crate::error::{ChannelError, Result};
use crate::message::{MessageHandle, OutgoingMessage, PinnedMessage, RecentMessage};
use crate::types::{
    ChannelId, FeedConfig, FeedUpdate, KeywordKind, KeywordRuleSet, PublisherId, TenantId, UserId,
};

/// Permission bit set of the bot in one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const ADMINISTRATOR: u64 = 1 << 3;
    pub const VIEW_CHANNEL: u64 = 1 << 10;
    pub const SEND_MESSAGES: u64 = 1 << 11;
    pub const MANAGE_MESSAGES: u64 = 1 << 13;
    pub const EMBED_LINKS: u64 = 1 << 14;
    pub const READ_MESSAGE_HISTORY: u64 = 1 << 16;
    pub const ALL: u64 = u64::MAX;

    pub fn contains(&self, bits: u64) -> bool {
        self.0 & Self::ADMINISTRATOR != 0 || self.0 & bits == bits
    }

    /// Enough to post feed messages.
    pub fn can_deliver(&self) -> bool {
        self.contains(Self::VIEW_CHANNEL | Self::SEND_MESSAGES | Self::EMBED_LINKS)
    }
}

/// What the bot can see of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAccess {
    /// Tenant the channel belongs to.
    pub tenant: TenantId,
    pub permissions: Permissions,
}

/// Chat platform surface used for delivery.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The bot's own account.
    async fn current_user(&self) -> std::result::Result<UserId, ChannelError>;

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> std::result::Result<MessageHandle, ChannelError>;

    async fn pin_message(&self, handle: MessageHandle) -> std::result::Result<(), ChannelError>;

    async fn unpin_message(&self, handle: MessageHandle) -> std::result::Result<(), ChannelError>;

    /// Pins, newest first.
    async fn list_pins(
        &self,
        channel: ChannelId,
    ) -> std::result::Result<Vec<PinnedMessage>, ChannelError>;

    async fn latest_message(
        &self,
        channel: ChannelId,
    ) -> std::result::Result<Option<RecentMessage>, ChannelError>;

    async fn delete_message(&self, handle: MessageHandle) -> std::result::Result<(), ChannelError>;

    /// Channel ownership and the bot's effective permissions there.
    async fn channel_access(
        &self,
        channel: ChannelId,
    ) -> std::result::Result<ChannelAccess, ChannelError>;

    /// Approximate member count, if the platform exposes it.
    async fn tenant_size(&self, tenant: TenantId) -> std::result::Result<Option<u64>, ChannelError>;
}

/// Persistent feed + keyword storage. Every call is atomic on its own.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn list_feeds(&self) -> Result<Vec<FeedConfig>>;

    async fn list_tenant_feeds(&self, tenant: TenantId) -> Result<Vec<FeedConfig>>;

    /// Fails with `FeedExists` if the tenant already has a feed for the publisher.
    async fn insert_feed(&self, feed: &FeedConfig) -> Result<()>;

    /// Applies the edits and returns the stored result. `ConfigNotFound` if absent.
    async fn update_feed(
        &self,
        tenant: TenantId,
        publisher: PublisherId,
        updates: &[FeedUpdate],
    ) -> Result<FeedConfig>;

    /// Returns whether a row was removed.
    async fn delete_feed(&self, tenant: TenantId, publisher: PublisherId) -> Result<bool>;

    async fn keyword_rules(&self, tenant: TenantId) -> Result<KeywordRuleSet>;

    /// Returns false if the (normalized) term already exists.
    async fn add_keyword(&self, tenant: TenantId, kind: KeywordKind, term: &str) -> Result<bool>;

    /// Returns false if the (normalized) term did not exist.
    async fn remove_keyword(&self, tenant: TenantId, kind: KeywordKind, term: &str)
    -> Result<bool>;

    /// Drop every feed and keyword of a tenant. Returns removed feed count.
    async fn delete_tenant(&self, tenant: TenantId) -> Result<usize>;
}
