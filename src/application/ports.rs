//! 애플리케이션 계층이 의존하는 포트(추상 인터페이스) 모음.

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::config::Config;
use crate::domain::digest::MessageStyle;
use crate::domain::provider::{ProviderKind, ProviderRef};
use crate::domain::pull_request::NormalizedPullRequest;
use crate::domain::schedule::Schedule;
use crate::domain::token::{OAuthState, TokenGrant, TokenRecord};

/// 설정 로딩/점검을 담당하는 저장소 포트.
pub trait ConfigRepository: Send + Sync {
    fn load(&self) -> Result<Config>;
    fn inspect_pretty_json(&self) -> Result<String>;
}

/// 스케줄 영속 계층. 사용자 범위 조회는 항상 소유자 id로 좁힌다.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// 모든 사용자의 활성 스케줄(디스패치 전용)
    async fn list_active_schedules(&self) -> Result<Vec<Schedule>>;
    async fn list_schedules(&self, user_id: &str) -> Result<Vec<Schedule>>;
    async fn get_schedule(&self, user_id: &str, schedule_id: &str) -> Result<Option<Schedule>>;
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<()>;
    /// `schedule.user_id` 소유의 기존 레코드를 교체한다. 없으면 false.
    async fn update_schedule(&self, schedule: &Schedule) -> Result<bool>;
    async fn delete_schedule(&self, user_id: &str, schedule_id: &str) -> Result<bool>;
    /// due 판정 하한으로 쓸 마지막 확인 시각을 기록한다.
    async fn record_check(&self, schedule_id: &str, checked_at: DateTime<Utc>) -> Result<()>;
}

/// 토큰 영속 계층.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn get_token(&self, user_id: &str, provider: &ProviderRef) -> Result<Option<TokenRecord>>;
    async fn save_token(&self, record: &TokenRecord) -> Result<()>;
    async fn delete_token(&self, user_id: &str, provider: &ProviderRef) -> Result<()>;
}

/// 프로세스 전역 단기 상태(OAuth state, rate-limit 카운터).
/// 다중 인스턴스 배포에서는 공유 캐시 구현으로 교체한다.
pub trait StateStore: Send + Sync {
    fn put_oauth_state(&self, state: OAuthState);
    /// 한 번만 꺼낼 수 있다.
    fn take_oauth_state(&self, state: &str) -> Option<OAuthState>;
    /// TTL이 지난 state를 지우고 지운 개수를 돌려준다.
    fn purge_expired_states(&self, now: DateTime<Utc>) -> usize;
    /// `window` 안의 요청 수가 `limit` 미만이면 슬롯을 기록하고 true.
    fn try_acquire_slot(&self, key: &str, limit: u32, window: Duration, now: Instant) -> bool;
}

/// OAuth 인가/토큰 엔드포인트 호출.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    fn authorize_url(&self, provider: ProviderKind, state: &str, redirect_uri: &str) -> Result<String>;
    async fn exchange_code(
        &self,
        provider: ProviderKind,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant>;
    async fn refresh(&self, provider: ProviderKind, refresh_token: &str) -> Result<TokenGrant>;
}

/// git 제공자 공통 기능.
#[async_trait]
pub trait GitProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    /// 토큰 소유자가 접근 가능한 저장소 full name 목록
    async fn get_repositories(&self, token: &str) -> Result<Vec<String>>;
    /// 열린 PR/MR을 정규화해 돌려준다. `repositories`가 비어 있으면 접근 가능한 전체.
    async fn get_pull_requests(
        &self,
        token: &str,
        repositories: &[String],
    ) -> Result<Vec<NormalizedPullRequest>>;
}

/// 메시지 대상 채널.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// 메신저 제공자 공통 기능.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn style(&self) -> &dyn MessageStyle;
    async fn get_channels(&self, credential: &str) -> Result<Vec<Channel>>;
    /// 한 번만 시도한다. 호출자도 재시도하지 않는다.
    async fn send_message(&self, credential: &str, channel_id: &str, body: &str) -> Result<()>;
}

/// 콘솔/로그 출력 추상화 포트.
pub trait Reporter: Send + Sync {
    fn section(&self, name: &str);
    fn kv(&self, key: &str, value: &str);
    fn status(&self, scope: &str, message: &str);
    fn raw(&self, line: &str);
}
