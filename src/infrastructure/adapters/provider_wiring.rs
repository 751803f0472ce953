//! 설정으로부터 제공자 어댑터와 OAuth 클라이언트를 조립한다.

use std::sync::Arc;

use anyhow::Result;
use reqwest::Client;

use crate::application::config::Config;
use crate::application::ports::{GitProvider, MessagingProvider, StateStore};
use crate::application::registry::ProviderRegistry;
use crate::application::retry::RetryPolicy;
use crate::domain::provider::{ProviderKind, ProviderRole};
use crate::infrastructure::git::{BitbucketAdapter, GitHubAdapter, GitLabAdapter};
use crate::infrastructure::http::{ApiClient, build_client};
use crate::infrastructure::messaging::{DiscordAdapter, SlackAdapter, TeamsAdapter};
use crate::infrastructure::oauth::OAuthHttpClient;
use crate::infrastructure::rate_limit::RateLimiter;

/// 모든 어댑터가 공유하는 HTTP 클라이언트/레이트 리미터/재시도 정책.
pub struct ProviderWiring {
    client: Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    pr_concurrency: usize,
}

impl ProviderWiring {
    pub fn new(config: &Config, store: Arc<dyn StateStore>) -> Result<Self> {
        Ok(Self {
            client: build_client(config.http_timeout())?,
            limiter: Arc::new(RateLimiter::new(store, config)),
            retry: RetryPolicy::from_config(config),
            pr_concurrency: config.pr_concurrency(),
        })
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn api_client(&self, kind: ProviderKind) -> ApiClient {
        ApiClient::new(self.client.clone(), kind, self.limiter.clone(), self.retry)
    }

    pub fn git_adapter(&self, kind: ProviderKind, config: &Config) -> Option<Arc<dyn GitProvider>> {
        let http = self.api_client(kind);
        let base = config.provider(kind).and_then(|p| p.api_base.as_deref());
        let adapter: Arc<dyn GitProvider> = match kind {
            ProviderKind::GitHub => Arc::new(GitHubAdapter::new(http, base, self.pr_concurrency)),
            ProviderKind::GitLab => Arc::new(GitLabAdapter::new(http, base, self.pr_concurrency)),
            ProviderKind::Bitbucket => {
                Arc::new(BitbucketAdapter::new(http, base, self.pr_concurrency))
            }
            _ => return None,
        };
        Some(adapter)
    }

    pub fn messaging_adapter(
        &self,
        kind: ProviderKind,
        config: &Config,
    ) -> Option<Arc<dyn MessagingProvider>> {
        let http = self.api_client(kind);
        let base = config.provider(kind).and_then(|p| p.api_base.as_deref());
        let adapter: Arc<dyn MessagingProvider> = match kind {
            ProviderKind::Slack => Arc::new(SlackAdapter::new(http, base)),
            // webhook URL 자체가 엔드포인트라 api_base가 없다
            ProviderKind::Discord => Arc::new(DiscordAdapter::new(http)),
            ProviderKind::Teams => Arc::new(TeamsAdapter::new(http, base)),
            _ => return None,
        };
        Some(adapter)
    }

    /// 지원하는 모든 제공자를 등록한 레지스트리.
    pub fn registry(&self, config: &Config) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for kind in ProviderKind::ALL {
            registry = match kind.role() {
                ProviderRole::Git => match self.git_adapter(kind, config) {
                    Some(adapter) => registry.with_git(adapter),
                    None => registry,
                },
                ProviderRole::Messaging => match self.messaging_adapter(kind, config) {
                    Some(adapter) => registry.with_messaging(adapter),
                    None => registry,
                },
            };
        }
        registry
    }

    pub fn oauth_client(&self, config: &Config) -> OAuthHttpClient {
        OAuthHttpClient::from_config(config, |kind| self.api_client(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::InMemoryStateStore;

    #[test]
    fn registry_covers_every_provider() {
        let config = Config::default();
        let wiring = ProviderWiring::new(&config, Arc::new(InMemoryStateStore::default())).unwrap();
        let registry = wiring.registry(&config);
        for kind in ProviderKind::ALL {
            match kind.role() {
                ProviderRole::Git => assert_eq!(registry.git(kind).unwrap().kind(), kind),
                ProviderRole::Messaging => {
                    assert_eq!(registry.messaging(kind).unwrap().kind(), kind)
                }
            }
        }
    }

    #[test]
    fn role_mismatch_yields_no_adapter() {
        let config = Config::default();
        let wiring = ProviderWiring::new(&config, Arc::new(InMemoryStateStore::default())).unwrap();
        assert!(wiring.git_adapter(ProviderKind::Slack, &config).is_none());
        assert!(wiring.messaging_adapter(ProviderKind::GitLab, &config).is_none());
    }
}
