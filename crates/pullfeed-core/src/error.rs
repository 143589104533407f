//! Error types for PullFeed.

use std::time::Duration;

use crate::types::{ChannelId, FeedKey, PublisherId, TenantId};

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, PullFeedError>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum PullFeedError {
    /// Upstream catalog fetch for one publisher failed. The previous snapshot stays in place.
    #[error("catalog fetch failed for {publisher}: {cause}")]
    Fetch {
        publisher: PublisherId,
        cause: String,
    },

    /// Guild, channel or permissions are gone. The occurrence is skipped, the feed stays armed.
    #[error("channel {channel} unavailable: {reason}")]
    ChannelUnavailable { channel: ChannelId, reason: String },

    #[error("send failed: {0}")]
    Send(#[source] ChannelError),

    #[error("pin failed: {0}")]
    Pin(#[source] ChannelError),

    #[error("no {publisher} feed configured for tenant {tenant}")]
    ConfigNotFound {
        tenant: TenantId,
        publisher: PublisherId,
    },

    #[error("a {publisher} feed already exists for tenant {tenant}")]
    FeedExists {
        tenant: TenantId,
        publisher: PublisherId,
    },

    /// Scheduling a key that already has a live timer. Callers must cancel first.
    #[error("feed {0} already has an active timer")]
    AlreadyScheduled(FeedKey),

    #[error("catalog for {0} has not been fetched yet")]
    CatalogNotReady(PublisherId),

    #[error("unknown publisher: {0}")]
    UnknownPublisher(String),

    #[error("invalid feed update: {0}")]
    InvalidUpdate(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure reported by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("http error: {0}")]
    Http(String),
}

impl From<ChannelError> for PullFeedError {
    fn from(e: ChannelError) -> Self {
        PullFeedError::Send(e)
    }
}
