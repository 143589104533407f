//! Outbound message model and platform size limits.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, MessageId, TenantId, UserId};

/// Aggregate character cap across all embeds of one message.
pub const MESSAGE_CHAR_LIMIT: usize = 6000;
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;
pub const MAX_FIELDS_PER_EMBED: usize = 25;
pub const TITLE_LIMIT: usize = 256;
pub const DESCRIPTION_LIMIT: usize = 4096;
pub const FIELD_NAME_LIMIT: usize = 256;
pub const FIELD_VALUE_LIMIT: usize = 1024;
pub const FOOTER_LIMIT: usize = 2048;
pub const CONTENT_LIMIT: usize = 2000;
/// Pins a channel can hold.
pub const PIN_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rich embed. Only the parts PullFeed renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Embed {
    pub fn colored(color: u32) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) {
        self.fields.push(EmbedField {
            name: truncate(&name.into(), FIELD_NAME_LIMIT),
            value: truncate(&value.into(), FIELD_VALUE_LIMIT),
            inline,
        });
    }

    /// Characters counted against [`MESSAGE_CHAR_LIMIT`].
    pub fn char_len(&self) -> usize {
        let opt = |s: &Option<String>| s.as_deref().map_or(0, |s| s.chars().count());
        opt(&self.title)
            + opt(&self.description)
            + opt(&self.footer)
            + self
                .fields
                .iter()
                .map(|f| f.name.chars().count() + f.value.chars().count())
                .sum::<usize>()
    }
}

/// One outbound send: optional text plus embeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embeds: Vec<Embed>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(truncate(&content.into(), CONTENT_LIMIT)),
            embeds: Vec::new(),
        }
    }

    pub fn embeds(embeds: Vec<Embed>) -> Self {
        Self {
            content: None,
            embeds,
        }
    }

    pub fn char_len(&self) -> usize {
        self.embeds.iter().map(Embed::char_len).sum()
    }
}

/// Reference to a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel: ChannelId,
    pub message: MessageId,
}

impl MessageHandle {
    pub fn jump_url(&self, tenant: TenantId) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            tenant, self.channel, self.message
        )
    }
}

/// A pinned message as listed by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinnedMessage {
    pub handle: MessageHandle,
    pub author: UserId,
}

/// Most recent message in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentMessage {
    pub handle: MessageHandle,
    pub author: UserId,
    /// The platform's "X pinned a message" system notice.
    pub is_pin_notice: bool,
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_len_counts_title_fields_footer() {
        let mut e = Embed::colored(0);
        e.title = Some("abc".into());
        e.footer = Some("de".into());
        e.add_field("f", "gh", true);
        assert_eq!(e.char_len(), 3 + 2 + 1 + 2);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 6), "hello…");
        assert_eq!(truncate("hello world", 6).chars().count(), 6);
    }

    #[test]
    fn test_jump_url() {
        let h = MessageHandle {
            channel: ChannelId(2),
            message: MessageId(3),
        };
        assert_eq!(h.jump_url(TenantId(1)), "https://discord.com/channels/1/2/3");
    }
}
