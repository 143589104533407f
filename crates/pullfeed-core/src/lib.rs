//! # PullFeed Core
//!
//! Shared vocabulary for the PullFeed workspace: releases, publishers, feed
//! configurations, keyword rules, the outbound message model, the error type
//! and the traits the scheduler uses to reach its collaborators.
//!
//! ```text
//! CatalogSource ──► ReleaseCatalog ──► DeliveryEngine ──► ChannelSender
//!                                         ▲      │
//!                          FeedScheduler ─┘      └──► FeedStore (keywords)
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod publisher;
pub mod timing;
pub mod traits;
pub mod types;

pub use config::PullFeedConfig;
pub use error::{ChannelError, PullFeedError, Result};
pub use message::{Embed, EmbedField, MessageHandle, OutgoingMessage, PinnedMessage, RecentMessage};
pub use publisher::{Publisher, PublisherRegistry};
pub use timing::{Clock, SystemClock};
pub use traits::{ChannelAccess, ChannelSender, FeedStore, Permissions};
pub use types::{
    ChannelId, DisplayFormat, FeedConfig, FeedKey, FeedUpdate, KeywordKind, KeywordRuleSet,
    MessageId, PublisherId, Release, ReleaseFormat, RoleId, TenantId, UserId,
};
