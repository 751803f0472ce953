//! Slack Web API 연동 구현.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::application::ports::{Channel, MessagingProvider};
use crate::domain::digest::MessageStyle;
use crate::domain::error::ProviderError;
use crate::domain::provider::ProviderKind;
use crate::infrastructure::http::{ApiClient, MAX_PAGES, api_base, decode_json};
use crate::infrastructure::render::SlackStyle;

const DEFAULT_API_BASE: &str = "https://slack.com/api";

pub struct SlackAdapter {
    http: ApiClient,
    api_base: String,
    style: SlackStyle,
}

impl SlackAdapter {
    pub fn new(http: ApiClient, base: Option<&str>) -> Self {
        Self {
            http,
            api_base: api_base(base, DEFAULT_API_BASE),
            style: SlackStyle,
        }
    }

    fn request(&self, method: Method, token: &str, url: &str) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(token)
    }
}

/// Slack은 대부분의 오류를 200 + `ok: false`로 돌려준다.
fn check_ok(ok: bool, error: Option<String>) -> Result<(), ProviderError> {
    if ok {
        return Ok(());
    }
    let code = error.unwrap_or_else(|| "unknown_error".to_string());
    Err(match code.as_str() {
        "invalid_auth" | "not_authed" | "token_expired" | "token_revoked" | "account_inactive" => {
            ProviderError::TokenExpired {
                provider: ProviderKind::Slack,
            }
        }
        "ratelimited" => ProviderError::RateLimited {
            provider: ProviderKind::Slack,
            retry_after: None,
        },
        _ => ProviderError::Rejected {
            provider: ProviderKind::Slack,
            status: 200,
            body: code,
        },
    })
}

#[derive(Debug, Deserialize)]
struct ConversationsPage {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<Conversation>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl MessagingProvider for SlackAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Slack
    }

    fn style(&self) -> &dyn MessageStyle {
        &self.style
    }

    async fn get_channels(&self, credential: &str) -> Result<Vec<Channel>> {
        let mut out = Vec::new();
        let mut cursor = String::new();
        for _ in 0..MAX_PAGES {
            let mut url = format!(
                "{}/conversations.list?types=public_channel,private_channel&exclude_archived=true&limit=200",
                self.api_base
            );
            if !cursor.is_empty() {
                url.push_str(&format!("&cursor={cursor}"));
            }
            let page: ConversationsPage = self
                .http
                .get_json("list channels", || self.request(Method::GET, credential, &url))
                .await?;
            check_ok(page.ok, page.error)?;
            out.extend(page.channels.into_iter().map(|c| Channel {
                id: c.id,
                name: c.name,
            }));
            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                break;
            }
        }
        Ok(out)
    }

    async fn send_message(&self, credential: &str, channel_id: &str, body: &str) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let request = self.request(Method::POST, credential, &url).json(&json!({
            "channel": channel_id,
            "text": body,
            "mrkdwn": true,
            "unfurl_links": false,
            "unfurl_media": false
        }));
        let response = self.http.send_once(request).await?;
        let parsed: PostMessageResponse = decode_json(ProviderKind::Slack, response).await?;
        check_ok(parsed.ok, parsed.error)?;
        debug!(channel_id, chars = body.chars().count(), "slack message posted");
        Ok(())
    }
}
