//! 적용 설정 진단(inspection) 뷰 모델.

use std::collections::BTreeMap;

use serde::Serialize;

use super::loader::LoadedConfig;
use super::resolve::resolve_client_credentials;
use crate::application::config::{DefaultsConfig, ProviderConfig};
use crate::domain::provider::{ProviderKind, ProviderRole};

#[derive(Debug, Clone, Serialize)]
pub struct ConfigInspection {
    pub searched_paths: Vec<String>,
    pub loaded_paths: Vec<String>,
    pub defaults: DefaultsConfig,
    pub effective_defaults: EffectiveDefaults,
    pub providers: BTreeMap<ProviderKind, ProviderInspection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveDefaults {
    pub lookback_minutes: i64,
    pub schedule_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub pr_concurrency: usize,
    pub schedule_concurrency: usize,
    pub redirect_uri: String,
    pub store_path: String,
    pub user_id: String,
    pub plan: String,
    pub git_per_minute: u32,
    pub messaging_per_minute: u32,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInspection {
    pub client_id_source: Option<String>,
    pub client_id_resolved: bool,
    pub client_secret_source: Option<String>,
    pub client_secret_resolved: bool,
    pub api_base: Option<String>,
    pub auth_base: Option<String>,
    /// client id/secret이 모두 있어야 인가 흐름을 시작할 수 있다.
    pub oauth_ready: bool,
}

impl ConfigInspection {
    pub(crate) fn from_loaded(loaded: LoadedConfig) -> Self {
        let config = &loaded.config;
        let providers = ProviderKind::ALL
            .into_iter()
            .map(|kind| (kind, ProviderInspection::from_config(kind, config.provider(kind))))
            .collect();

        Self {
            searched_paths: loaded
                .searched_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            loaded_paths: loaded
                .loaded_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            defaults: config.defaults.clone(),
            effective_defaults: EffectiveDefaults {
                lookback_minutes: config.lookback().num_minutes(),
                schedule_timeout_secs: config.schedule_timeout().as_secs(),
                http_timeout_secs: config.http_timeout().as_secs(),
                pr_concurrency: config.pr_concurrency(),
                schedule_concurrency: config.schedule_concurrency(),
                redirect_uri: config.redirect_uri(),
                store_path: config.store_path(),
                user_id: config.user_id(),
                plan: format!("{:?}", config.plan()).to_ascii_lowercase(),
                git_per_minute: config.rate_limit(ProviderRole::Git).max_requests,
                messaging_per_minute: config.rate_limit(ProviderRole::Messaging).max_requests,
                max_retries: config.max_retries(),
            },
            providers,
        }
    }
}

impl ProviderInspection {
    fn from_config(kind: ProviderKind, cfg: Option<&ProviderConfig>) -> Self {
        let creds = resolve_client_credentials(kind, cfg);
        let id_ready = creds.client_id.value.is_some();
        let secret_ready = creds.client_secret.value.is_some();
        Self {
            client_id_source: creds.client_id.source,
            client_id_resolved: id_ready,
            client_secret_source: creds.client_secret.source,
            client_secret_resolved: secret_ready,
            api_base: cfg.and_then(|c| c.api_base.clone()),
            auth_base: cfg.and_then(|c| c.auth_base.clone()),
            oauth_ready: id_ready && secret_ready,
        }
    }
}
