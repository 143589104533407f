//! # PullFeed Scheduler
//!
//! Weekly per-feed timers and everything one occurrence needs: keyword
//! filtering, trigger offsets, per-channel serialization, rendering into
//! size-bounded messages and pin rotation.
//!
//! ```text
//! FeedService ──► FeedStore
//!     │
//!     ▼
//! FeedScheduler ── one task per FeedKey ──► DeliveryEngine ──► ChannelSender
//!                                               │
//!                                    ChannelLocks + ReleaseCatalog
//! ```

pub mod delivery;
pub mod filter;
pub mod locks;
pub mod offsets;
pub mod pins;
pub mod render;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod testing;

pub use delivery::{DeliveryEngine, DeliveryReport, FeedDelivery};
pub use locks::ChannelLocks;
pub use offsets::{ScheduleOffsets, Spacing, spread_offsets};
pub use pins::{PinOutcome, pin_with_rotation};
pub use scheduler::{FeedScheduler, SyncReport};
pub use service::FeedService;
