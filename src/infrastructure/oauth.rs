//! 제공자별 OAuth 2.0 인가 URL 생성과 토큰 엔드포인트 호출.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::application::config::Config;
use crate::application::ports::OAuthClient;
use crate::domain::error::ProviderError;
use crate::domain::provider::ProviderKind;
use crate::domain::token::TokenGrant;
use crate::infrastructure::config::resolve_client_credentials;
use crate::infrastructure::http::{ApiClient, decode_json};

/// 인가/토큰 엔드포인트와 scope 표기 규칙.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub scope_separator: &'static str,
    /// client 자격 증명을 Basic 인증 헤더로 보낸다(Bitbucket).
    pub basic_auth: bool,
}

impl OAuthEndpoints {
    pub fn for_kind(kind: ProviderKind, auth_base: Option<&str>, scopes: Option<&[String]>) -> Self {
        let (default_base, authorize_path, token_path, default_scopes, separator): (
            &str,
            &str,
            &str,
            &[&str],
            &'static str,
        ) = match kind {
            ProviderKind::GitHub => (
                "https://github.com",
                "/login/oauth/authorize",
                "/login/oauth/access_token",
                &["repo", "read:user"],
                " ",
            ),
            ProviderKind::GitLab => (
                "https://gitlab.com",
                "/oauth/authorize",
                "/oauth/token",
                &["read_api", "read_user"],
                " ",
            ),
            ProviderKind::Bitbucket => (
                "https://bitbucket.org",
                "/site/oauth2/authorize",
                "/site/oauth2/access_token",
                &["repository", "pullrequest", "account"],
                " ",
            ),
            ProviderKind::Slack => (
                "https://slack.com",
                "/oauth/v2/authorize",
                "/api/oauth.v2.access",
                &["channels:read", "groups:read", "chat:write"],
                ",",
            ),
            ProviderKind::Discord => (
                "https://discord.com",
                "/oauth2/authorize",
                "/api/oauth2/token",
                &["identify", "webhook.incoming"],
                " ",
            ),
            ProviderKind::Teams => (
                "https://login.microsoftonline.com/common",
                "/oauth2/v2.0/authorize",
                "/oauth2/v2.0/token",
                &[
                    "offline_access",
                    "Team.ReadBasic.All",
                    "Channel.ReadBasic.All",
                    "ChannelMessage.Send",
                ],
                " ",
            ),
        };
        let base = auth_base
            .map(|b| b.trim_end_matches('/'))
            .filter(|b| !b.is_empty())
            .unwrap_or(default_base);
        Self {
            authorize_url: format!("{base}{authorize_path}"),
            token_url: format!("{base}{token_path}"),
            scopes: scopes
                .map(|s| s.to_vec())
                .unwrap_or_else(|| default_scopes.iter().map(|s| s.to_string()).collect()),
            scope_separator: separator,
            basic_auth: kind == ProviderKind::Bitbucket,
        }
    }

    fn scope(&self) -> String {
        self.scopes.join(self.scope_separator)
    }
}

#[derive(Debug, Clone)]
struct ClientApp {
    endpoints: OAuthEndpoints,
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// 설정에서 해석한 OAuth 앱 정보로 토큰 엔드포인트를 호출한다.
pub struct OAuthHttpClient {
    apps: BTreeMap<ProviderKind, ClientApp>,
    clients: BTreeMap<ProviderKind, ApiClient>,
}

impl OAuthHttpClient {
    /// `api_client`는 제공자 종류별 HTTP 호출기를 만든다.
    pub fn from_config(config: &Config, api_client: impl Fn(ProviderKind) -> ApiClient) -> Self {
        let mut apps = BTreeMap::new();
        let mut clients = BTreeMap::new();
        for kind in ProviderKind::ALL {
            let cfg = config.provider(kind);
            let creds = resolve_client_credentials(kind, cfg);
            apps.insert(
                kind,
                ClientApp {
                    endpoints: OAuthEndpoints::for_kind(
                        kind,
                        cfg.and_then(|c| c.auth_base.as_deref()),
                        cfg.and_then(|c| c.scopes.as_deref()),
                    ),
                    client_id: creds.client_id.value,
                    client_secret: creds.client_secret.value,
                },
            );
            clients.insert(kind, api_client(kind));
        }
        Self { apps, clients }
    }

    fn app(&self, kind: ProviderKind) -> Result<(&ClientApp, &str)> {
        let app = self
            .apps
            .get(&kind)
            .ok_or_else(|| anyhow!("{kind}: oauth is not configured"))?;
        let client_id = app.client_id.as_deref().ok_or_else(|| {
            anyhow!(
                "{kind}: client id is not configured (set providers.{kind}.client_id or {}_CLIENT_ID)",
                kind.as_str().to_ascii_uppercase()
            )
        })?;
        Ok((app, client_id))
    }

    fn http(&self, kind: ProviderKind) -> Result<&ApiClient> {
        self.clients
            .get(&kind)
            .ok_or_else(|| anyhow!("{kind}: no http client"))
    }

    async fn token_request(
        &self,
        kind: ProviderKind,
        mut form: Vec<(&'static str, String)>,
    ) -> Result<TokenGrant> {
        let (app, client_id) = self.app(kind)?;
        let secret = app.client_secret.clone().ok_or_else(|| {
            anyhow!(
                "{kind}: client secret is not configured (set providers.{kind}.client_secret_env or {}_CLIENT_SECRET)",
                kind.as_str().to_ascii_uppercase()
            )
        })?;
        let http = self.http(kind)?;

        let mut request = http
            .request(Method::POST, &app.endpoints.token_url)
            .header(ACCEPT, "application/json");
        if app.endpoints.basic_auth {
            request = request.basic_auth(client_id, Some(&secret));
        } else {
            form.push(("client_id", client_id.to_string()));
            form.push(("client_secret", secret));
        }
        if kind == ProviderKind::Teams {
            form.push(("scope", app.endpoints.scope()));
        }

        debug!(provider = %kind, url = %app.endpoints.token_url, "token request");
        let response = http.send_once(request.form(&form)).await?;
        let status = response.status().as_u16();
        let raw: RawTokenResponse = decode_json(kind, response).await?;
        raw.into_grant(kind, status)
    }
}

#[async_trait]
impl OAuthClient for OAuthHttpClient {
    fn authorize_url(&self, provider: ProviderKind, state: &str, redirect_uri: &str) -> Result<String> {
        let (app, client_id) = self.app(provider)?;
        let mut url = Url::parse(&app.endpoints.authorize_url)
            .with_context(|| format!("invalid authorize url: {}", app.endpoints.authorize_url))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("state", state)
                .append_pair("scope", &app.endpoints.scope());
            match provider {
                // Slack은 response_type 없이 동작한다
                ProviderKind::Slack => {}
                ProviderKind::Teams => {
                    query
                        .append_pair("response_type", "code")
                        .append_pair("response_mode", "query");
                }
                ProviderKind::Discord => {
                    query
                        .append_pair("response_type", "code")
                        .append_pair("prompt", "consent");
                }
                _ => {
                    query.append_pair("response_type", "code");
                }
            }
        }
        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        provider: ProviderKind,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant> {
        self.token_request(
            provider,
            vec![
                ("grant_type", "authorization_code".to_string()),
                ("code", code.to_string()),
                ("redirect_uri", redirect_uri.to_string()),
            ],
        )
        .await
    }

    async fn refresh(&self, provider: ProviderKind, refresh_token: &str) -> Result<TokenGrant> {
        self.token_request(
            provider,
            vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token.to_string()),
            ],
        )
        .await
    }
}

/// 제공자 토큰 응답의 합집합 형태.
#[derive(Debug, Default, Deserialize)]
struct RawTokenResponse {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    /// Discord `webhook.incoming` scope 응답
    #[serde(default)]
    webhook: Option<RawWebhook>,
}

#[derive(Debug, Deserialize)]
struct RawWebhook {
    url: String,
}

impl RawTokenResponse {
    /// 2xx 본문 안의 오류(GitHub `error`, Slack `ok: false`)도 거절로 처리한다.
    fn into_grant(self, provider: ProviderKind, status: u16) -> Result<TokenGrant> {
        if self.ok == Some(false) || self.error.is_some() {
            let mut body = self.error.unwrap_or_else(|| "unknown_error".to_string());
            if let Some(desc) = self.error_description {
                body.push_str(&format!(": {desc}"));
            }
            return Err(ProviderError::Rejected {
                provider,
                status,
                body,
            }
            .into());
        }
        let access_token = self
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider,
                message: "token response has no access_token".to_string(),
            })?;
        Ok(TokenGrant {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.trim().is_empty()),
            expires_in: self.expires_in.filter(|s| *s > 0),
            scope: self.scope,
            token_type: self.token_type,
            webhook_url: self.webhook.map(|w| w.url),
        })
    }
}
