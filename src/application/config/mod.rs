//! 애플리케이션이 사용하는 설정 스키마(순수 데이터).
//!
//! 주의: 파일/환경변수 접근은 `infrastructure`에서만 수행한다.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::provider::{ProviderKind, ProviderRole};
use crate::domain::schedule::PlanTier;

pub const DEFAULT_LOOKBACK_MINUTES: i64 = 15;
pub const DEFAULT_SCHEDULE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PR_CONCURRENCY: usize = 4;
pub const DEFAULT_SCHEDULE_CONCURRENCY: usize = 1;
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8976/oauth/callback";
pub const DEFAULT_STORE_PATH: &str = ".prdigest/store.json";
pub const DEFAULT_USER_ID: &str = "local";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// 전역 기본값
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// 제공자 역할별 sliding-window 한도
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    /// 토큰 교환/조회 재시도 정책
    #[serde(default)]
    pub retry: RetryConfig,
    /// 제공자별 OAuth 앱/엔드포인트 설정
    #[serde(default)]
    pub providers: BTreeMap<ProviderKind, ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DefaultsConfig {
    /// 마지막 확인 시각이 없을 때 due 판정에 쓰는 과거 구간(분)
    pub lookback_minutes: Option<i64>,
    /// 스케줄 하나에 허용하는 최대 처리 시간(초)
    pub schedule_timeout_secs: Option<u64>,
    /// 개별 HTTP 요청 타임아웃(초)
    pub http_timeout_secs: Option<u64>,
    /// PR 상세 조회 동시 실행 수
    pub pr_concurrency: Option<usize>,
    /// 스케줄 동시 처리 수(기본 1: 순차)
    pub schedule_concurrency: Option<usize>,
    /// OAuth 콜백 URI
    pub redirect_uri: Option<String>,
    /// 스케줄/토큰 JSON 저장소 경로
    pub store_path: Option<String>,
    /// CLI가 대리하는 사용자 id
    pub user_id: Option<String>,
    /// 사용자 구독 등급(free/pro/team)
    pub plan: Option<PlanTier>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RateLimitsConfig {
    pub git_per_minute: Option<u32>,
    pub messaging_per_minute: Option<u32>,
    pub window_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProviderConfig {
    /// OAuth 앱 client id
    pub client_id: Option<String>,
    /// client id를 읽을 환경변수 이름
    pub client_id_env: Option<String>,
    /// client secret(민감정보: 권장하지 않음)
    pub client_secret: Option<String>,
    /// client secret을 읽을 환경변수 이름
    pub client_secret_env: Option<String>,
    /// REST API base URL override(선택)
    pub api_base: Option<String>,
    /// OAuth authorize/token base URL override(선택)
    pub auth_base: Option<String>,
    /// 요청할 scope 목록 override(선택)
    pub scopes: Option<Vec<String>>,
}

/// 한도 하나: window 안에서 허용하는 요청 수.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
    pub poll_interval: Duration,
}

impl Config {
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::minutes(
            self.defaults
                .lookback_minutes
                .filter(|m| *m > 0)
                .unwrap_or(DEFAULT_LOOKBACK_MINUTES),
        )
    }

    pub fn schedule_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .schedule_timeout_secs
                .unwrap_or(DEFAULT_SCHEDULE_TIMEOUT_SECS),
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .http_timeout_secs
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        )
    }

    pub fn pr_concurrency(&self) -> usize {
        self.defaults
            .pr_concurrency
            .unwrap_or(DEFAULT_PR_CONCURRENCY)
            .max(1)
    }

    pub fn schedule_concurrency(&self) -> usize {
        self.defaults
            .schedule_concurrency
            .unwrap_or(DEFAULT_SCHEDULE_CONCURRENCY)
            .max(1)
    }

    pub fn redirect_uri(&self) -> String {
        self.defaults
            .redirect_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string())
    }

    pub fn store_path(&self) -> String {
        self.defaults
            .store_path
            .clone()
            .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string())
    }

    pub fn user_id(&self) -> String {
        self.defaults
            .user_id
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string())
    }

    pub fn plan(&self) -> PlanTier {
        self.defaults.plan.unwrap_or(PlanTier::Free)
    }

    /// 역할별 한도. git 60/분, 메신저 50/분이 기본값이다.
    pub fn rate_limit(&self, role: ProviderRole) -> RateLimit {
        let max_requests = match role {
            ProviderRole::Git => self.rate_limits.git_per_minute.unwrap_or(60),
            ProviderRole::Messaging => self.rate_limits.messaging_per_minute.unwrap_or(50),
        };
        RateLimit {
            max_requests: max_requests.max(1),
            window: Duration::from_secs(self.rate_limits.window_secs.unwrap_or(60)),
            poll_interval: Duration::from_millis(self.rate_limits.poll_interval_ms.unwrap_or(1000)),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries.unwrap_or(3)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry.base_delay_ms.unwrap_or(1000))
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.get(&kind)
    }

    /// 후순위(나중 파일) 값으로 덮어쓰는 병합 규칙.
    pub fn merge_from(&mut self, other: Config) {
        self.defaults.merge_from(other.defaults);
        self.rate_limits.merge_from(other.rate_limits);
        self.retry.merge_from(other.retry);

        for (kind, incoming) in other.providers {
            if let Some(existing) = self.providers.get_mut(&kind) {
                existing.merge_from(incoming);
            } else {
                self.providers.insert(kind, incoming);
            }
        }
    }
}

macro_rules! overwrite_some {
    ($target:expr, $other:expr, [$($field:ident),* $(,)?]) => {
        $(
            if $other.$field.is_some() {
                $target.$field = $other.$field;
            }
        )*
    };
}

impl DefaultsConfig {
    pub fn merge_from(&mut self, other: DefaultsConfig) {
        overwrite_some!(
            self,
            other,
            [
                lookback_minutes,
                schedule_timeout_secs,
                http_timeout_secs,
                pr_concurrency,
                schedule_concurrency,
                redirect_uri,
                store_path,
                user_id,
                plan,
            ]
        );
    }
}

impl RateLimitsConfig {
    pub fn merge_from(&mut self, other: RateLimitsConfig) {
        overwrite_some!(
            self,
            other,
            [git_per_minute, messaging_per_minute, window_secs, poll_interval_ms]
        );
    }
}

impl RetryConfig {
    pub fn merge_from(&mut self, other: RetryConfig) {
        overwrite_some!(self, other, [max_retries, base_delay_ms]);
    }
}

impl ProviderConfig {
    pub fn merge_from(&mut self, other: ProviderConfig) {
        overwrite_some!(
            self,
            other,
            [
                client_id,
                client_id_env,
                client_secret,
                client_secret_env,
                api_base,
                auth_base,
                scopes,
            ]
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_file_overrides_only_present_fields() {
        let mut base: Config = serde_json::from_str(
            r#"{
                "defaults": { "lookback_minutes": 30, "store_path": "/var/lib/prdigest.json" },
                "providers": { "github": { "client_id": "base", "api_base": "https://ghe.test/api/v3" } }
            }"#,
        )
        .unwrap();
        let project: Config = serde_json::from_str(
            r#"{
                "defaults": { "lookback_minutes": 5 },
                "rate_limits": { "git_per_minute": 10 },
                "providers": { "github": { "client_id": "project" }, "slack": { "client_id": "s" } }
            }"#,
        )
        .unwrap();
        base.merge_from(project);

        assert_eq!(base.lookback(), chrono::Duration::minutes(5));
        assert_eq!(base.store_path(), "/var/lib/prdigest.json");
        let github = base.provider(ProviderKind::GitHub).unwrap();
        assert_eq!(github.client_id.as_deref(), Some("project"));
        assert_eq!(github.api_base.as_deref(), Some("https://ghe.test/api/v3"));
        assert!(base.provider(ProviderKind::Slack).is_some());
        assert_eq!(base.rate_limit(ProviderRole::Git).max_requests, 10);
        assert_eq!(base.rate_limit(ProviderRole::Messaging).max_requests, 50);
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::default();
        assert_eq!(cfg.lookback(), chrono::Duration::minutes(15));
        assert_eq!(cfg.max_retries(), 3);
        assert_eq!(cfg.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(cfg.plan(), PlanTier::Free);
        assert_eq!(cfg.schedule_concurrency(), 1);
    }
}
