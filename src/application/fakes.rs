//! 유스케이스 테스트용 포트 구현.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::application::ports::{
    Channel, GitProvider, MessagingProvider, OAuthClient, Reporter, ScheduleRepository,
    TokenRepository,
};
use crate::domain::digest::MessageStyle;
use crate::domain::error::ProviderError;
use crate::domain::provider::{ProviderKind, ProviderRef};
use crate::domain::pull_request::NormalizedPullRequest;
use crate::domain::schedule::Schedule;
use crate::domain::token::{TokenGrant, TokenRecord};

/// 2026-05-18 09:00 UTC (월요일)
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 18, 9, 0, 0).unwrap()
}

/// 만료 없는 기본 토큰.
pub fn token(user_id: &str, kind: ProviderKind) -> TokenRecord {
    TokenGrant {
        access_token: format!("{kind}-token"),
        refresh_token: Some(format!("{kind}-refresh")),
        ..TokenGrant::default()
    }
    .into_record(user_id, ProviderRef::new(kind, "default"), now())
}

#[derive(Default)]
pub struct FakeSchedules {
    items: Mutex<Vec<Schedule>>,
    pub fail_listing: bool,
}

impl FakeSchedules {
    pub fn with(schedules: Vec<Schedule>) -> Self {
        Self {
            items: Mutex::new(schedules),
            fail_listing: false,
        }
    }

    pub fn last_checked(&self, id: &str) -> Option<DateTime<Utc>> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.last_checked_at)
    }
}

#[async_trait]
impl ScheduleRepository for FakeSchedules {
    async fn list_active_schedules(&self) -> Result<Vec<Schedule>> {
        if self.fail_listing {
            anyhow::bail!("database unavailable");
        }
        Ok(self.items.lock().unwrap().iter().filter(|s| s.active).cloned().collect())
    }

    async fn list_schedules(&self, user_id: &str) -> Result<Vec<Schedule>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_schedule(&self, user_id: &str, schedule_id: &str) -> Result<Option<Schedule>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.user_id == user_id && s.id == schedule_id)
            .cloned())
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> Result<()> {
        self.items.lock().unwrap().push(schedule.clone());
        Ok(())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<bool> {
        let mut items = self.items.lock().unwrap();
        match items
            .iter_mut()
            .find(|s| s.user_id == schedule.user_id && s.id == schedule.id)
        {
            Some(slot) => {
                *slot = schedule.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_schedule(&self, user_id: &str, schedule_id: &str) -> Result<bool> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|s| !(s.user_id == user_id && s.id == schedule_id));
        Ok(items.len() != before)
    }

    async fn record_check(&self, schedule_id: &str, checked_at: DateTime<Utc>) -> Result<()> {
        if let Some(s) = self
            .items
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.id == schedule_id)
        {
            s.last_checked_at = Some(checked_at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTokens {
    items: Mutex<HashMap<(String, ProviderRef), TokenRecord>>,
}

impl FakeTokens {
    pub fn with(record: TokenRecord) -> Self {
        let tokens = Self::default();
        tokens.insert(record);
        tokens
    }

    pub fn insert(&self, record: TokenRecord) {
        self.items
            .lock()
            .unwrap()
            .insert((record.user_id.clone(), record.provider.clone()), record);
    }

    pub fn get(&self, user_id: &str, provider: &ProviderRef) -> Option<TokenRecord> {
        self.items
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), provider.clone()))
            .cloned()
    }
}

#[async_trait]
impl TokenRepository for FakeTokens {
    async fn get_token(&self, user_id: &str, provider: &ProviderRef) -> Result<Option<TokenRecord>> {
        Ok(self.get(user_id, provider))
    }

    async fn save_token(&self, record: &TokenRecord) -> Result<()> {
        self.insert(record.clone());
        Ok(())
    }

    async fn delete_token(&self, user_id: &str, provider: &ProviderRef) -> Result<()> {
        self.items
            .lock()
            .unwrap()
            .remove(&(user_id.to_string(), provider.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOAuth {
    refreshes: AtomicU32,
    fail_refresh: bool,
}

impl FakeOAuth {
    pub fn failing_refresh() -> Self {
        Self {
            fail_refresh: true,
            ..Self::default()
        }
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthClient for FakeOAuth {
    fn authorize_url(&self, provider: ProviderKind, state: &str, redirect_uri: &str) -> Result<String> {
        Ok(format!("https://auth.test/{provider}?state={state}&redirect_uri={redirect_uri}"))
    }

    async fn exchange_code(
        &self,
        _provider: ProviderKind,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant> {
        Ok(TokenGrant {
            access_token: format!("exchanged-{code}"),
            refresh_token: Some("rt".into()),
            expires_in: Some(3600),
            ..TokenGrant::default()
        })
    }

    async fn refresh(&self, provider: ProviderKind, _refresh_token: &str) -> Result<TokenGrant> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_refresh {
            return Err(ProviderError::Rejected {
                provider,
                status: 400,
                body: "invalid_grant".into(),
            }
            .into());
        }
        Ok(TokenGrant {
            access_token: format!("refreshed-{n}"),
            expires_in: Some(3600),
            ..TokenGrant::default()
        })
    }
}

/// 저장소별 PR을 돌려주는 git 제공자.
pub struct FakeGit {
    kind: ProviderKind,
    repos: Mutex<Vec<(String, Vec<NormalizedPullRequest>)>>,
    /// 이 토큰으로 호출하면 401
    pub rejected_tokens: Mutex<HashSet<String>>,
    pub fail_with: Mutex<Option<u16>>,
    pub seen_tokens: Mutex<Vec<String>>,
}

impl FakeGit {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            repos: Mutex::new(Vec::new()),
            rejected_tokens: Mutex::new(HashSet::new()),
            fail_with: Mutex::new(None),
            seen_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn add_repo(&self, name: &str, prs: Vec<NormalizedPullRequest>) {
        self.repos.lock().unwrap().push((name.to_string(), prs));
    }
}

#[async_trait]
impl GitProvider for FakeGit {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn get_repositories(&self, _token: &str) -> Result<Vec<String>> {
        Ok(self.repos.lock().unwrap().iter().map(|(n, _)| n.clone()).collect())
    }

    async fn get_pull_requests(
        &self,
        token: &str,
        repositories: &[String],
    ) -> Result<Vec<NormalizedPullRequest>> {
        self.seen_tokens.lock().unwrap().push(token.to_string());
        if self.rejected_tokens.lock().unwrap().contains(token) {
            return Err(ProviderError::TokenExpired { provider: self.kind }.into());
        }
        if let Some(status) = *self.fail_with.lock().unwrap() {
            return Err(ProviderError::Server {
                provider: self.kind,
                status,
                body: "boom".into(),
            }
            .into());
        }
        Ok(self
            .repos
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| repositories.is_empty() || repositories.contains(name))
            .flat_map(|(_, prs)| prs.clone())
            .collect())
    }
}

pub struct TestStyle;

impl MessageStyle for TestStyle {
    fn soft_cap(&self) -> usize {
        1500
    }
    fn bold(&self, text: &str) -> String {
        format!("**{text}**")
    }
    fn link(&self, text: &str, url: &str) -> String {
        format!("[{text}]({url})")
    }
    fn mention(&self, handle: &str) -> String {
        format!("<@{handle}>")
    }
}

/// 전송 내역을 기록하는 메신저.
pub struct FakeMessenger {
    kind: ProviderKind,
    style: TestStyle,
    pub sent: Mutex<Vec<SentMessage>>,
    pub failing_channels: Mutex<HashSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub credential: String,
    pub channel_id: String,
    pub body: String,
}

impl FakeMessenger {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            style: TestStyle,
            sent: Mutex::new(Vec::new()),
            failing_channels: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_channel(&self, channel_id: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingProvider for FakeMessenger {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn style(&self) -> &dyn MessageStyle {
        &self.style
    }

    async fn get_channels(&self, credential: &str) -> Result<Vec<Channel>> {
        Ok(vec![Channel {
            id: credential.to_string(),
            name: "general".to_string(),
        }])
    }

    async fn send_message(&self, credential: &str, channel_id: &str, body: &str) -> Result<()> {
        if self.failing_channels.lock().unwrap().contains(channel_id) {
            return Err(ProviderError::Server {
                provider: self.kind,
                status: 500,
                body: "send failed".into(),
            }
            .into());
        }
        self.sent.lock().unwrap().push(SentMessage {
            credential: credential.to_string(),
            channel_id: channel_id.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeReporter {
    pub lines: Mutex<Vec<String>>,
}

impl Reporter for FakeReporter {
    fn section(&self, name: &str) {
        self.lines.lock().unwrap().push(format!("== {name}"));
    }
    fn kv(&self, key: &str, value: &str) {
        self.lines.lock().unwrap().push(format!("{key}: {value}"));
    }
    fn status(&self, scope: &str, message: &str) {
        self.lines.lock().unwrap().push(format!("[{scope}] {message}"));
    }
    fn raw(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}
