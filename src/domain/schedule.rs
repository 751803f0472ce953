//! 스케줄(크론 잡) 엔티티와 편집 경계 검증 규칙.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cron::{
    convert_cron_from_utc, convert_cron_to_utc, timezone_offset, validate_cron,
};
use crate::domain::error::ValidationErrors;
use crate::domain::provider::{ProviderRef, ProviderRole};

pub const DEFAULT_DIGEST_TITLE: &str = "DAILY REMINDER FOR OPEN PULL REQUESTS";

/// PR 필터. 차원 간은 AND, 라벨/제목 키워드 내부는 OR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrFilters {
    /// 부분 문자열, 대소문자 무시
    #[serde(default)]
    pub labels: Vec<String>,
    /// 부분 문자열, 대소문자 무시
    #[serde(default)]
    pub title_keywords: Vec<String>,
    /// 정확히 일치(대소문자 구분)
    #[serde(default)]
    pub excluded_authors: Vec<String>,
    pub min_age_days: Option<i64>,
    pub max_age_days: Option<i64>,
}

impl PrFilters {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.min_age_days.is_some_and(|v| v < 0) {
            errors.push("min_age_days", "must not be negative");
        }
        if self.max_age_days.is_some_and(|v| v < 0) {
            errors.push("max_age_days", "must not be negative");
        }
        if let (Some(min), Some(max)) = (self.min_age_days, self.max_age_days)
            && min > max
        {
            errors.push("min_age_days", "must be less than or equal to max_age_days");
        }
        errors.into_result()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
            && self.title_keywords.is_empty()
            && self.excluded_authors.is_empty()
            && self.min_age_days.is_none()
            && self.max_age_days.is_none()
    }
}

/// 오래 기다린 PR을 별도 채널로 알리는 설정. 있으면 전부 있고, 없으면 전부 없다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationConfig {
    pub messaging: ProviderRef,
    pub channel_id: String,
    pub threshold_days: u32,
    /// 에스컬레이션 메시지에서 호출할 이해관계자 핸들
    #[serde(default)]
    pub mentions: Vec<String>,
}

/// 사용자 소유 스케줄. 크론은 UTC로 저장한다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub cron_utc: String,
    /// 표시용 원래 시간대
    pub timezone: String,
    pub git: ProviderRef,
    pub repositories: Vec<String>,
    pub messaging: ProviderRef,
    pub channel_id: String,
    pub escalation: Option<EscalationConfig>,
    #[serde(default)]
    pub filters: Option<PrFilters>,
    #[serde(default)]
    pub send_when_empty: bool,
    pub active: bool,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// 메시지 헤더 제목. 이름이 없으면 기본 제목을 쓴다.
    pub fn digest_title(&self) -> &str {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            DEFAULT_DIGEST_TITLE
        } else {
            trimmed
        }
    }

    /// 편집 화면에 보여줄 현지 시간 크론.
    pub fn display_cron(&self) -> String {
        convert_cron_from_utc(&self.cron_utc, &self.timezone)
            .unwrap_or_else(|_| self.cron_utc.clone())
    }
}

/// 대시보드가 보내는 생성/수정 입력. 크론은 사용자 현지 시간 기준이다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDraft {
    #[serde(default)]
    pub name: String,
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub git: Option<ProviderRef>,
    #[serde(default)]
    pub repositories: Vec<String>,
    pub messaging: Option<ProviderRef>,
    #[serde(default)]
    pub channel_id: String,
    pub escalation_messaging: Option<ProviderRef>,
    pub escalation_channel_id: Option<String>,
    pub escalation_days: Option<i64>,
    #[serde(default)]
    pub escalation_mentions: Vec<String>,
    pub filters: Option<PrFilters>,
    #[serde(default)]
    pub send_when_empty: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

/// 검증을 통과한 초안. 저장 직전 형태(UTC 크론 포함).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub name: String,
    pub cron_utc: String,
    pub timezone: String,
    pub git: ProviderRef,
    pub repositories: Vec<String>,
    pub messaging: ProviderRef,
    pub channel_id: String,
    pub escalation: Option<EscalationConfig>,
    pub filters: Option<PrFilters>,
    pub send_when_empty: bool,
    pub active: bool,
}

impl ScheduleDraft {
    /// 모든 필드 오류를 모아 검증하고, 통과하면 UTC 크론으로 변환한다.
    pub fn validate(&self) -> Result<ValidatedDraft, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if timezone_offset(&self.timezone).is_none() {
            errors.push("timezone", format!("unsupported timezone '{}'", self.timezone));
        }
        let cron_utc = match validate_cron(&self.cron) {
            Ok(()) => convert_cron_to_utc(&self.cron, &self.timezone).ok(),
            Err(cron_errors) => {
                errors.errors.extend(cron_errors.errors);
                None
            }
        };

        match &self.git {
            Some(git) if git.kind.role() == ProviderRole::Git => {}
            Some(git) => errors.push("git", format!("{} is not a git provider", git.kind)),
            None => errors.push("git", "git provider is required"),
        }
        if self.repositories.iter().all(|r| r.trim().is_empty()) {
            errors.push("repositories", "select at least one repository");
        }

        match &self.messaging {
            Some(m) if m.kind.role() == ProviderRole::Messaging => {}
            Some(m) => errors.push("messaging", format!("{} is not a messaging provider", m.kind)),
            None => errors.push("messaging", "messaging provider is required"),
        }
        if self.channel_id.trim().is_empty() {
            errors.push("channel_id", "target channel is required");
        }

        let escalation = self.validate_escalation(&mut errors);

        if let Some(filters) = &self.filters
            && let Err(filter_errors) = filters.validate()
        {
            errors.extend_prefixed("filters", filter_errors);
        }

        errors.into_result()?;

        // 위에서 오류가 없었으므로 아래 값은 모두 존재한다.
        let (Some(cron_utc), Some(git), Some(messaging)) =
            (cron_utc, self.git.clone(), self.messaging.clone())
        else {
            return Err(ValidationErrors::single("draft", "incomplete schedule"));
        };

        Ok(ValidatedDraft {
            name: self.name.trim().to_string(),
            cron_utc,
            timezone: self.timezone.trim().to_string(),
            git,
            repositories: self
                .repositories
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            messaging,
            channel_id: self.channel_id.trim().to_string(),
            escalation,
            filters: self.filters.clone().filter(|f| !f.is_empty()),
            send_when_empty: self.send_when_empty,
            active: self.active,
        })
    }

    fn validate_escalation(&self, errors: &mut ValidationErrors) -> Option<EscalationConfig> {
        let channel = self
            .escalation_channel_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let any_set = channel.is_some()
            || self.escalation_days.is_some()
            || self.escalation_messaging.is_some();
        if !any_set {
            return None;
        }

        if channel.is_none() {
            errors.push("escalation_channel_id", "escalation channel is required");
        }
        match self.escalation_days {
            None => errors.push("escalation_days", "escalation day count is required"),
            Some(days) if days < 1 => errors.push("escalation_days", "must be at least 1"),
            Some(_) => {}
        }
        // 에스컬레이션 제공자를 따로 고르지 않으면 기본 메신저를 쓴다.
        let messaging = self
            .escalation_messaging
            .clone()
            .or_else(|| self.messaging.clone());
        if let Some(m) = &messaging
            && m.kind.role() != ProviderRole::Messaging
        {
            errors.push(
                "escalation_messaging",
                format!("{} is not a messaging provider", m.kind),
            );
        }

        Some(EscalationConfig {
            messaging: messaging?,
            channel_id: channel?.to_string(),
            threshold_days: u32::try_from(self.escalation_days?).ok().filter(|d| *d >= 1)?,
            mentions: self
                .escalation_mentions
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
        })
    }
}

/// 구독 등급. 등급별 스케줄 수 제한은 CRUD 경계에서만 검사한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Team,
}

impl PlanTier {
    pub fn max_schedules(self) -> usize {
        match self {
            Self::Free => 1,
            Self::Pro => 10,
            Self::Team => 50,
        }
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "team" => Ok(Self::Team),
            other => Err(format!("unknown plan tier: {other}")),
        }
    }
}
