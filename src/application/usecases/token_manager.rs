//! OAuth 토큰 수명주기(발급/갱신/만료 판정) 유스케이스.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, info, warn};

use crate::application::ports::{OAuthClient, StateStore, TokenRepository};
use crate::application::retry::RetryPolicy;
use crate::domain::error::ProviderError;
use crate::domain::provider::ProviderRef;
use crate::domain::token::{OAuthState, TokenRecord};

const STATE_LEN: usize = 32;

/// 인가 시작 결과: 사용자를 보낼 URL과 발급한 state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationStart {
    pub url: String,
    pub state: String,
}

pub struct TokenManager<'a> {
    pub tokens: &'a dyn TokenRepository,
    pub oauth: &'a dyn OAuthClient,
    pub states: &'a dyn StateStore,
    pub retry: RetryPolicy,
}

impl<'a> TokenManager<'a> {
    /// 현재 유효한 토큰을 돌려준다.
    ///
    /// - 유효하면 저장된 값을 그대로 반환
    /// - 만료 + refresh token 있음: 한 번 갱신 후 저장
    /// - 만료 + refresh token 없음: 갱신 시도 없이 TokenExpired
    /// - 갱신 실패: 그사이 다른 호출이 갱신해 저장했으면 그 값을, 아니면 레코드를 지우고 TokenExpired
    pub async fn get_valid_token(
        &self,
        user_id: &str,
        provider: &ProviderRef,
        now: DateTime<Utc>,
    ) -> Result<TokenRecord> {
        let record = self
            .tokens
            .get_token(user_id, provider)
            .await
            .with_context(|| format!("failed to load token for {provider}"))?;

        let Some(record) = record else {
            return Err(anyhow!(ProviderError::TokenExpired {
                provider: provider.kind
            })
            .context(format!("no token stored for {provider}; run `prdigest auth start`")));
        };

        if !record.is_expired(now) {
            return Ok(record);
        }
        if !record.can_refresh() {
            return Err(anyhow!(ProviderError::TokenExpired {
                provider: provider.kind
            })
            .context(format!("token for {provider} expired and cannot be refreshed")));
        }

        debug!(%provider, user_id, "access token expired, refreshing");
        self.refresh(record, now).await
    }

    /// 제공자가 401을 돌려준 뒤 한 번 강제로 갱신한다.
    pub async fn refresh_after_rejection(
        &self,
        user_id: &str,
        provider: &ProviderRef,
        now: DateTime<Utc>,
    ) -> Result<TokenRecord> {
        let record = self.tokens.get_token(user_id, provider).await?;
        match record {
            Some(record) if record.can_refresh() => self.refresh(record, now).await,
            _ => Err(anyhow!(ProviderError::TokenExpired {
                provider: provider.kind
            })
            .context(format!("{provider} rejected the token and it cannot be refreshed"))),
        }
    }

    async fn refresh(&self, mut record: TokenRecord, now: DateTime<Utc>) -> Result<TokenRecord> {
        let kind = record.kind();
        let refresh_token = record.refresh_token.clone().unwrap_or_default();
        let refreshed = self
            .retry
            .run("token refresh", || self.oauth.refresh(kind, &refresh_token))
            .await;

        match refreshed {
            Ok(grant) => {
                record.apply_grant(grant, now);
                self.tokens
                    .save_token(&record)
                    .await
                    .context("failed to persist refreshed token")?;
                info!(provider = %record.provider, user_id = %record.user_id, "token refreshed");
                Ok(record)
            }
            Err(err) => {
                if let Some(current) = self.refreshed_elsewhere(&record, now).await {
                    debug!(
                        provider = %record.provider,
                        user_id = %record.user_id,
                        "token was refreshed concurrently, using stored value"
                    );
                    return Ok(current);
                }
                warn!(
                    provider = %record.provider,
                    user_id = %record.user_id,
                    error = %format!("{err:#}"),
                    "token refresh failed, removing stored token"
                );
                if let Err(delete_err) = self.delete_if_unchanged(&record).await {
                    warn!(error = %format!("{delete_err:#}"), "failed to delete stale token");
                }
                Err(anyhow!(ProviderError::TokenExpired { provider: kind })
                    .context(format!("refresh failed: {err:#}")))
            }
        }
    }

    /// 갱신 실패 후 다시 읽은 레코드가 다른 호출이 저장한 유효 토큰이면 돌려준다.
    async fn refreshed_elsewhere(
        &self,
        failed: &TokenRecord,
        now: DateTime<Utc>,
    ) -> Option<TokenRecord> {
        let current = self
            .tokens
            .get_token(&failed.user_id, &failed.provider)
            .await
            .ok()
            .flatten()?;
        let replaced = current.refresh_token != failed.refresh_token
            || current.access_token != failed.access_token;
        (replaced && !current.is_expired(now)).then_some(current)
    }

    /// 저장된 refresh token이 실패한 값과 같을 때만 지운다.
    async fn delete_if_unchanged(&self, failed: &TokenRecord) -> Result<()> {
        let current = self
            .tokens
            .get_token(&failed.user_id, &failed.provider)
            .await?;
        match current {
            Some(current) if current.refresh_token == failed.refresh_token => {
                self.tokens
                    .delete_token(&failed.user_id, &failed.provider)
                    .await
            }
            _ => Ok(()),
        }
    }

    /// 인가 URL을 만들고 일회용 state를 저장한다.
    pub fn begin_authorization(
        &self,
        user_id: &str,
        provider: &ProviderRef,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationStart> {
        let purged = self.states.purge_expired_states(now);
        if purged > 0 {
            debug!(purged, "expired oauth states removed");
        }

        let state = generate_state();
        let url = self
            .oauth
            .authorize_url(provider.kind, &state, redirect_uri)?;
        self.states.put_oauth_state(OAuthState {
            state: state.clone(),
            provider: provider.clone(),
            user_id: user_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            created_at: now,
        });
        Ok(AuthorizationStart { url, state })
    }

    /// 콜백 처리: state를 소비하고 code를 토큰으로 교환해 저장한다.
    pub async fn complete_authorization(
        &self,
        state: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenRecord> {
        let Some(pending) = self.states.take_oauth_state(state) else {
            bail!("unknown or already used oauth state");
        };
        if pending.is_expired(now) {
            bail!("oauth state expired; start the authorization again");
        }

        let grant = self
            .retry
            .run("token exchange", || {
                self.oauth
                    .exchange_code(pending.provider.kind, code, &pending.redirect_uri)
            })
            .await
            .with_context(|| format!("failed to exchange code for {}", pending.provider))?;

        let record = grant.into_record(&pending.user_id, pending.provider.clone(), now);
        self.tokens
            .save_token(&record)
            .await
            .context("failed to persist new token")?;
        info!(provider = %record.provider, user_id = %record.user_id, "provider connected");
        Ok(record)
    }
}

pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}
