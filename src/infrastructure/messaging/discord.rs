//! Discord incoming webhook 연동 구현.
//!
//! OAuth `webhook.incoming` scope로 받은 webhook URL이 자격 증명이다.
//! webhook은 한 채널에 묶여 있으므로 채널 목록도 그 채널 하나뿐이다.

use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::application::ports::{Channel, MessagingProvider};
use crate::domain::digest::MessageStyle;
use crate::domain::provider::ProviderKind;
use crate::infrastructure::http::ApiClient;
use crate::infrastructure::render::{DISCORD_HARD_LIMIT, DiscordStyle, clamp_chars};

pub struct DiscordAdapter {
    http: ApiClient,
    style: DiscordStyle,
}

impl DiscordAdapter {
    pub fn new(http: ApiClient) -> Self {
        Self {
            http,
            style: DiscordStyle,
        }
    }
}

fn webhook_url(credential: &str) -> Result<&str> {
    if credential.starts_with("https://") || credential.starts_with("http://") {
        return Ok(credential);
    }
    bail!("discord: no incoming webhook stored for this connection; reconnect discord")
}

#[derive(Debug, Deserialize)]
struct Webhook {
    channel_id: String,
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl MessagingProvider for DiscordAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Discord
    }

    fn style(&self) -> &dyn MessageStyle {
        &self.style
    }

    async fn get_channels(&self, credential: &str) -> Result<Vec<Channel>> {
        let url = webhook_url(credential)?;
        let webhook: Webhook = self
            .http
            .get_json("get webhook", || self.http.request(Method::GET, url))
            .await?;
        Ok(vec![Channel {
            name: webhook.name.unwrap_or_else(|| webhook.channel_id.clone()),
            id: webhook.channel_id,
        }])
    }

    async fn send_message(&self, credential: &str, channel_id: &str, body: &str) -> Result<()> {
        let url = webhook_url(credential)?;
        let content = clamp_chars(body, DISCORD_HARD_LIMIT);
        if content.len() != body.len() {
            warn!(channel_id, chars = body.chars().count(), "discord message clamped to hard limit");
        }
        let request = self
            .http
            .request(Method::POST, &format!("{url}?wait=true"))
            .json(&json!({
                "content": content,
                "allowed_mentions": { "parse": ["users", "roles"] }
            }));
        self.http.send_once(request).await?;
        debug!(channel_id, "discord webhook delivered");
        Ok(())
    }
}
