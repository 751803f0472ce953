//! 대시보드 선택 목록(저장소/채널) 조회 유스케이스.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};

use crate::application::ports::Channel;
use crate::application::registry::ProviderRegistry;
use crate::application::usecases::token_manager::TokenManager;
use crate::domain::provider::{ProviderRef, ProviderRole};

pub struct ProviderCatalogUseCase<'a> {
    pub tokens: TokenManager<'a>,
    pub registry: &'a ProviderRegistry,
}

impl<'a> ProviderCatalogUseCase<'a> {
    pub async fn repositories(
        &self,
        user_id: &str,
        provider: &ProviderRef,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        if provider.kind.role() != ProviderRole::Git {
            bail!("{} is not a git provider", provider.kind);
        }
        let git = self.registry.git(provider.kind)?;
        let token = self.tokens.get_valid_token(user_id, provider, now).await?;
        let mut repos = git
            .get_repositories(&token.access_token)
            .await
            .with_context(|| format!("failed to list repositories from {provider}"))?;
        repos.sort();
        repos.dedup();
        Ok(repos)
    }

    pub async fn channels(
        &self,
        user_id: &str,
        provider: &ProviderRef,
        now: DateTime<Utc>,
    ) -> Result<Vec<Channel>> {
        if provider.kind.role() != ProviderRole::Messaging {
            bail!("{} is not a messaging provider", provider.kind);
        }
        let messenger = self.registry.messaging(provider.kind)?;
        let token = self.tokens.get_valid_token(user_id, provider, now).await?;
        messenger
            .get_channels(token.credential())
            .await
            .with_context(|| format!("failed to list channels from {provider}"))
    }
}
