//! # PullFeed Channels
//!
//! Chat platform adapters implementing [`ChannelSender`](pullfeed_core::ChannelSender).
//! Discord is the only platform; its REST API is used directly, without a
//! gateway connection.

pub mod discord;
pub mod permissions;

pub use discord::DiscordSender;
