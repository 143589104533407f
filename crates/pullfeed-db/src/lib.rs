//! # PullFeed DB
//!
//! SQLite-backed [`FeedStore`](pullfeed_core::FeedStore): one row per
//! (tenant, publisher) feed and one row per normalized keyword term.

pub mod store;

pub use store::FeedDb;
