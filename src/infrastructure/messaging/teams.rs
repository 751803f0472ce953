//! Microsoft Teams(Graph API) 채널 메시지 연동 구현.
//!
//! 채널 id는 `<team id>/<channel id>` 형태로 저장한다.
//! Graph 채널 id 자체에 `:`가 들어가므로 구분자로 `/`를 쓴다.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::application::ports::{Channel, MessagingProvider};
use crate::domain::digest::MessageStyle;
use crate::domain::provider::ProviderKind;
use crate::infrastructure::http::{ApiClient, MAX_PAGES, api_base};
use crate::infrastructure::render::TeamsStyle;

const DEFAULT_API_BASE: &str = "https://graph.microsoft.com/v1.0";

pub struct TeamsAdapter {
    http: ApiClient,
    api_base: String,
    style: TeamsStyle,
}

impl TeamsAdapter {
    pub fn new(http: ApiClient, base: Option<&str>) -> Self {
        Self {
            http,
            api_base: api_base(base, DEFAULT_API_BASE),
            style: TeamsStyle,
        }
    }

    fn request(&self, method: Method, token: &str, url: &str) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(token)
    }

    /// `@odata.nextLink`를 따라 순회한다.
    async fn collection<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        operation: &str,
        first: String,
    ) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;
        while let Some(url) = next.take() {
            pages += 1;
            let page: Collection<T> = self
                .http
                .get_json(operation, || self.request(Method::GET, token, &url))
                .await?;
            out.extend(page.value);
            if pages >= MAX_PAGES {
                break;
            }
            next = page.next_link;
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Named {
    id: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Mention {
    id: usize,
    mention_text: String,
    mentioned: serde_json::Value,
}

/// `<at>handle</at>` 태그에 순번 id를 붙이고 Graph `mentions` 배열을 만든다.
/// handle은 AAD 사용자 id로 취급한다.
fn attach_mentions(body: &str) -> (String, Vec<Mention>) {
    let mut out = String::with_capacity(body.len());
    let mut mentions = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<at>") {
        let after = &rest[start + 4..];
        let Some(end) = after.find("</at>") else {
            break;
        };
        let handle = &after[..end];
        let id = mentions.len();
        out.push_str(&rest[..start]);
        out.push_str(&format!("<at id=\"{id}\">{handle}</at>"));
        mentions.push(Mention {
            id,
            mention_text: handle.to_string(),
            mentioned: json!({ "user": { "id": handle, "displayName": handle, "userIdentityType": "aadUser" } }),
        });
        rest = &after[end + 5..];
    }
    out.push_str(rest);
    (out, mentions)
}

#[async_trait]
impl MessagingProvider for TeamsAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Teams
    }

    fn style(&self) -> &dyn MessageStyle {
        &self.style
    }

    async fn get_channels(&self, credential: &str) -> Result<Vec<Channel>> {
        let teams: Vec<Named> = self
            .collection(credential, "list joined teams", format!("{}/me/joinedTeams", self.api_base))
            .await?;
        let mut out = Vec::new();
        for team in teams {
            let url = format!("{}/teams/{}/channels", self.api_base, team.id);
            let channels: Vec<Named> = self.collection(credential, "list channels", url).await?;
            out.extend(channels.into_iter().map(|c| Channel {
                id: format!("{}/{}", team.id, c.id),
                name: format!("{} / {}", team.display_name, c.display_name),
            }));
        }
        Ok(out)
    }

    async fn send_message(&self, credential: &str, channel_id: &str, body: &str) -> Result<()> {
        let (team_id, channel) = channel_id
            .split_once('/')
            .ok_or_else(|| anyhow!("teams: channel id must look like <team id>/<channel id>"))
            .with_context(|| format!("invalid teams channel: {channel_id}"))?;
        let (content, mentions) = attach_mentions(body);
        let url = format!(
            "{}/teams/{team_id}/channels/{channel}/messages",
            self.api_base
        );
        let request = self
            .request(Method::POST, credential, &url)
            .json(&json!({
                "body": { "contentType": "html", "content": content },
                "mentions": mentions
            }));
        self.http.send_once(request).await?;
        debug!(team_id, channel, mentions = mentions.len(), "teams message posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http::test_support::api_client;
    use httpmock::prelude::*;

    fn adapter(server: &MockServer) -> TeamsAdapter {
        TeamsAdapter::new(api_client(ProviderKind::Teams), Some(&server.base_url()))
    }

    #[test]
    fn mentions_get_sequential_ids() {
        let (content, mentions) = attach_mentions("cc <at>u-1</at> <at>u-2</at><br>\nend");
        assert_eq!(content, "cc <at id=\"0\">u-1</at> <at id=\"1\">u-2</at><br>\nend");
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[1].mention_text, "u-2");
    }

    #[tokio::test]
    async fn channels_are_listed_per_joined_team() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/me/joinedTeams");
            then.status(200).json_body(json!({
                "value": [{ "id": "t1", "displayName": "Platform" }]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/teams/t1/channels");
            then.status(200).json_body(json!({
                "value": [{ "id": "19:abc@thread.tacv2", "displayName": "General" }]
            }));
        });
        let channels = adapter(&server).get_channels("tok").await.unwrap();
        assert_eq!(channels[0].id, "t1/19:abc@thread.tacv2");
        assert_eq!(channels[0].name, "Platform / General");
    }

    #[tokio::test]
    async fn message_is_posted_as_html() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/teams/t1/channels/19:abc@thread.tacv2/messages")
                .body_includes("\"contentType\":\"html\"");
            then.status(201).json_body(json!({ "id": "m1" }));
        });
        adapter(&server)
            .send_message("tok", "t1/19:abc@thread.tacv2", "<b>Daily</b>")
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn malformed_channel_id_fails_before_sending() {
        let server = MockServer::start();
        let err = adapter(&server)
            .send_message("tok", "just-a-channel", "hi")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("<team id>/<channel id>"));
    }
}
