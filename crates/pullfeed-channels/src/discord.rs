//! Discord bot over the REST API.
//!
//! Rate limits are handled the way Discord recommends: no hardcoded budgets,
//! a 429 waits for `Retry-After` (or `X-RateLimit-Reset-After`) and retries.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pullfeed_core::config::DiscordConfig;
use pullfeed_core::{
    ChannelAccess, ChannelError, ChannelId, ChannelSender, MessageHandle, MessageId,
    OutgoingMessage, PinnedMessage, PullFeedError, RecentMessage, TenantId, UserId,
};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::permissions::{Overwrite, OverwriteTarget, channel_permissions};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Message type of the "X pinned a message" system notice.
const PIN_NOTICE_TYPE: u8 = 6;

type ChannelResult<T> = std::result::Result<T, ChannelError>;

// ─── Wire types ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    #[serde(rename = "type", default)]
    kind: u8,
    author: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    guild_id: Option<String>,
    #[serde(default)]
    permission_overwrites: Vec<WireOverwrite>,
}

#[derive(Debug, Deserialize)]
struct WireOverwrite {
    id: String,
    /// 0 = role, 1 = member
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    allow: String,
    #[serde(default)]
    deny: String,
}

#[derive(Debug, Deserialize)]
struct WireRole {
    id: String,
    permissions: String,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireGuild {
    approximate_member_count: Option<u64>,
}

fn snowflake(raw: &str) -> ChannelResult<u64> {
    raw.parse()
        .map_err(|_| ChannelError::Http(format!("invalid snowflake '{raw}'")))
}

fn bits(raw: &str) -> u64 {
    raw.parse().unwrap_or(0)
}

/// Build the `POST /channels/{id}/messages` body.
pub fn message_payload(message: &OutgoingMessage) -> Value {
    let embeds: Vec<Value> = message
        .embeds
        .iter()
        .map(|e| {
            let mut embed = json!({});
            if let Some(title) = &e.title {
                embed["title"] = json!(title);
            }
            if let Some(description) = &e.description {
                embed["description"] = json!(description);
            }
            if let Some(url) = &e.url {
                embed["url"] = json!(url);
            }
            if let Some(color) = e.color {
                embed["color"] = json!(color);
            }
            if !e.fields.is_empty() {
                embed["fields"] = json!(e.fields);
            }
            if let Some(footer) = &e.footer {
                embed["footer"] = json!({ "text": footer });
            }
            if let Some(image) = &e.image_url {
                embed["image"] = json!({ "url": image });
            }
            if let Some(thumbnail) = &e.thumbnail_url {
                embed["thumbnail"] = json!({ "url": thumbnail });
            }
            embed
        })
        .collect();

    let mut payload = json!({ "embeds": embeds });
    if let Some(content) = &message.content {
        payload["content"] = json!(content);
    }
    payload
}

/// Parse the wait duration of a 429 response.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok()?.parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Map a non-success status onto the platform error kinds.
pub fn classify(status: StatusCode, body: &str, retry_after: Option<Duration>) -> ChannelError {
    match status {
        StatusCode::FORBIDDEN => ChannelError::Forbidden(body.to_string()),
        StatusCode::NOT_FOUND => ChannelError::NotFound(body.to_string()),
        StatusCode::TOO_MANY_REQUESTS => ChannelError::RateLimited { retry_after },
        other => ChannelError::Http(format!("{other} - {body}")),
    }
}

/// [`ChannelSender`] backed by the Discord REST API.
pub struct DiscordSender {
    api_base: String,
    token: String,
    client: reqwest::Client,
    bot: OnceCell<UserId>,
}

impl DiscordSender {
    /// An empty token is accepted; every request then fails with 401.
    pub fn new(config: &DiscordConfig) -> pullfeed_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PullFeedError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
            bot: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    /// Send with rate limit handling. Non-success statuses become [`ChannelError`]s.
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> ChannelResult<reqwest::Response> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let mut req = self
                .client
                .request(method.clone(), self.url(path))
                .header("Authorization", format!("Bot {}", self.token));
            if let Some(body) = body {
                req = req.json(body);
            }
            let response = req
                .send()
                .await
                .map_err(|e| ChannelError::Http(format!("Discord request failed: {e}")))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(response.headers());
                if attempts > MAX_RATE_LIMIT_RETRIES {
                    tracing::warn!(
                        "⚠️ Discord rate limit: max retries ({MAX_RATE_LIMIT_RETRIES}) exceeded on {method} {path}"
                    );
                    return Err(ChannelError::RateLimited { retry_after: wait });
                }
                let wait = wait.unwrap_or(Duration::from_secs(1));
                tracing::debug!(
                    "Discord rate limited (429), waiting {wait:?} (attempt {attempts}/{MAX_RATE_LIMIT_RETRIES})"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Discord {method} {path} failed: {status} - {body}");
            return Err(classify(status, &body, None));
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ChannelResult<T> {
        self.request(Method::GET, path, None)
            .await?
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("Invalid Discord response: {e}")))
    }

    async fn bot_id(&self) -> ChannelResult<UserId> {
        self.bot
            .get_or_try_init(|| async {
                let me: WireUser = self.get("/users/@me").await?;
                Ok::<_, ChannelError>(UserId(snowflake(&me.id)?))
            })
            .await
            .copied()
    }
}

#[async_trait]
impl ChannelSender for DiscordSender {
    async fn current_user(&self) -> ChannelResult<UserId> {
        self.bot_id().await
    }

    async fn send_message(&self, channel: ChannelId, message: OutgoingMessage) -> ChannelResult<MessageHandle> {
        let payload = message_payload(&message);
        let sent: WireMessage = self
            .request(Method::POST, &format!("/channels/{channel}/messages"), Some(&payload))
            .await?
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("Invalid send response: {e}")))?;
        Ok(MessageHandle {
            channel,
            message: MessageId(snowflake(&sent.id)?),
        })
    }

    async fn pin_message(&self, handle: MessageHandle) -> ChannelResult<()> {
        let path = format!("/channels/{}/pins/{}", handle.channel, handle.message);
        self.request(Method::PUT, &path, None).await?;
        Ok(())
    }

    async fn unpin_message(&self, handle: MessageHandle) -> ChannelResult<()> {
        let path = format!("/channels/{}/pins/{}", handle.channel, handle.message);
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn list_pins(&self, channel: ChannelId) -> ChannelResult<Vec<PinnedMessage>> {
        let pins: Vec<WireMessage> = self.get(&format!("/channels/{channel}/pins")).await?;
        pins.into_iter()
            .map(|m| {
                Ok(PinnedMessage {
                    handle: MessageHandle {
                        channel,
                        message: MessageId(snowflake(&m.id)?),
                    },
                    author: UserId(m.author.as_ref().map_or(Ok(0), |a| snowflake(&a.id))?),
                })
            })
            .collect()
    }

    async fn latest_message(&self, channel: ChannelId) -> ChannelResult<Option<RecentMessage>> {
        let messages: Vec<WireMessage> = self
            .get(&format!("/channels/{channel}/messages?limit=1"))
            .await?;
        let Some(m) = messages.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(RecentMessage {
            handle: MessageHandle {
                channel,
                message: MessageId(snowflake(&m.id)?),
            },
            author: UserId(m.author.as_ref().map_or(Ok(0), |a| snowflake(&a.id))?),
            is_pin_notice: m.kind == PIN_NOTICE_TYPE,
        }))
    }

    async fn delete_message(&self, handle: MessageHandle) -> ChannelResult<()> {
        let path = format!("/channels/{}/messages/{}", handle.channel, handle.message);
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn channel_access(&self, channel: ChannelId) -> ChannelResult<ChannelAccess> {
        let info: WireChannel = self.get(&format!("/channels/{channel}")).await?;
        let guild_id = info
            .guild_id
            .as_deref()
            .map(snowflake)
            .transpose()?
            .ok_or_else(|| ChannelError::NotFound(format!("channel {channel} is not in a guild")))?;

        let bot = self.bot_id().await?;
        let roles_path = format!("/guilds/{guild_id}/roles");
        let member_path = format!("/guilds/{guild_id}/members/{bot}");
        let (roles, member) = tokio::try_join!(
            self.get::<Vec<WireRole>>(&roles_path),
            self.get::<WireMember>(&member_path),
        )?;

        let roles: HashMap<u64, u64> = roles
            .iter()
            .filter_map(|r| Some((r.id.parse().ok()?, bits(&r.permissions))))
            .collect();
        let member_roles: Vec<u64> = member.roles.iter().filter_map(|r| r.parse().ok()).collect();
        let overwrites: Vec<Overwrite> = info
            .permission_overwrites
            .iter()
            .filter_map(|o| {
                let id = o.id.parse().ok()?;
                let target = match o.kind {
                    0 => OverwriteTarget::Role(id),
                    1 => OverwriteTarget::Member(id),
                    _ => return None,
                };
                Some(Overwrite {
                    target,
                    allow: bits(&o.allow),
                    deny: bits(&o.deny),
                })
            })
            .collect();

        Ok(ChannelAccess {
            tenant: TenantId(guild_id),
            permissions: channel_permissions(guild_id, bot.0, &member_roles, &roles, &overwrites),
        })
    }

    async fn tenant_size(&self, tenant: TenantId) -> ChannelResult<Option<u64>> {
        let guild: WireGuild = self.get(&format!("/guilds/{tenant}?with_counts=true")).await?;
        Ok(guild.approximate_member_count)
    }
}
